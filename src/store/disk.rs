use super::{FeedStore, stamp};
use crate::core::FeedConfiguration;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use tracing::debug;

const PARTITION: &str = "feeds";

/// Feeds in a fjall partition, keyed by id, stored as JSON.
pub struct DiskFeedStore {
    // Held so the keyspace outlives the partition handle.
    _keyspace: Keyspace,
    feeds: PartitionHandle,
}

impl DiskFeedStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open feed store at {}", path.display()))?;
        let feeds = keyspace
            .open_partition(PARTITION, PartitionCreateOptions::default())
            .context("Failed to open feeds partition")?;
        debug!("Opened feed store at {}", path.display());

        Ok(DiskFeedStore {
            _keyspace: keyspace,
            feeds,
        })
    }

    fn read(&self, id: &str) -> Result<Option<FeedConfiguration>> {
        match self.feeds.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt feed record: {id}"))?,
            )),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FeedStore for DiskFeedStore {
    async fn upsert(&self, config: FeedConfiguration) -> Result<FeedConfiguration> {
        let existing = match &config.id {
            Some(id) => self.read(id)?,
            None => None,
        };
        let stored = stamp(config, existing.as_ref());
        let id = stored.id.clone().unwrap_or_default();

        self.feeds.insert(id.as_bytes(), serde_json::to_vec(&stored)?)?;
        debug!("Stored feed {}", id);
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<FeedConfiguration>> {
        self.read(id)
    }

    async fn list(&self) -> Result<Vec<FeedConfiguration>> {
        let mut feeds = Vec::new();
        for entry in self.feeds.iter() {
            let (key, value) = entry?;
            let feed: FeedConfiguration = serde_json::from_slice(&value).with_context(|| {
                format!("Corrupt feed record: {}", String::from_utf8_lossy(&key))
            })?;
            feeds.push(feed);
        }
        feeds.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(feeds)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        if self.feeds.get(id.as_bytes())?.is_none() {
            return Ok(false);
        }
        self.feeds.remove(id.as_bytes())?;
        debug!("Removed feed {}", id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::feed::Chain;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let id = {
            let store = DiskFeedStore::open(dir.path()).unwrap();
            let saved = store
                .upsert(FeedConfiguration {
                    symbol: "SOL/USD".to_string(),
                    chain: Some(Chain::Monad),
                    ..Default::default()
                })
                .await
                .unwrap();
            saved.id.unwrap()
        };

        let store = DiskFeedStore::open(dir.path()).unwrap();
        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.symbol, "SOL/USD");
        assert_eq!(loaded.chain, Some(Chain::Monad));
        assert!(loaded.created_at.is_some());
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_list_orders_by_creation() {
        let dir = tempdir().unwrap();
        let store = DiskFeedStore::open(dir.path()).unwrap();

        let first = store.upsert(FeedConfiguration::default()).await.unwrap();
        let second = store
            .upsert(FeedConfiguration {
                symbol: "ETH/USD".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut renamed = first.clone();
        renamed.name = "Renamed".to_string();
        let renamed = store.upsert(renamed).await.unwrap();
        assert_eq!(renamed.created_at, first.created_at);

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[0].name, "Renamed");
        assert_eq!(all[1].id, second.id);

        assert!(store.remove(second.id.as_deref().unwrap()).await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(!store.remove("missing").await.unwrap());
    }
}
