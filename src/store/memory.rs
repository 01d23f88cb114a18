use super::{FeedStore, stamp};
use crate::core::FeedConfiguration;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Process-local store, used by tests and when no data path is wanted.
#[derive(Clone, Default)]
pub struct MemoryFeedStore {
    inner: Arc<Mutex<Vec<FeedConfiguration>>>,
}

impl MemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    async fn upsert(&self, config: FeedConfiguration) -> Result<FeedConfiguration> {
        let mut feeds = self.inner.lock().await;
        let position = config
            .id
            .as_ref()
            .and_then(|id| feeds.iter().position(|f| f.id.as_ref() == Some(id)));

        let stored = stamp(config, position.map(|i| &feeds[i]));
        match position {
            Some(i) => feeds[i] = stored.clone(),
            None => feeds.push(stored.clone()),
        }
        debug!("Stored feed {:?}", stored.id);
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<FeedConfiguration>> {
        let feeds = self.inner.lock().await;
        Ok(feeds.iter().find(|f| f.id.as_deref() == Some(id)).cloned())
    }

    async fn list(&self) -> Result<Vec<FeedConfiguration>> {
        Ok(self.inner.lock().await.clone())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut feeds = self.inner.lock().await;
        let before = feeds.len();
        feeds.retain(|f| f.id.as_deref() != Some(id));
        Ok(feeds.len() != before)
    }
}
