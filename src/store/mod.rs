//! Persisted feed configurations.

pub mod disk;
pub mod memory;

use crate::core::FeedConfiguration;
use crate::core::config::AppConfig;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

pub use disk::DiskFeedStore;
pub use memory::MemoryFeedStore;

/// Identity-keyed storage: `upsert` replaces the record with the same id and
/// appends otherwise.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Returns the record as stored, with id and timestamps filled in.
    async fn upsert(&self, config: FeedConfiguration) -> Result<FeedConfiguration>;
    async fn get(&self, id: &str) -> Result<Option<FeedConfiguration>>;
    /// Oldest first.
    async fn list(&self) -> Result<Vec<FeedConfiguration>>;
    async fn remove(&self, id: &str) -> Result<bool>;
}

/// Assigns an id to new records and sets `createdAt`/`updatedAt`.
pub(crate) fn stamp(
    mut config: FeedConfiguration,
    existing: Option<&FeedConfiguration>,
) -> FeedConfiguration {
    let now = Utc::now();
    if config.id.is_none() {
        let id = Uuid::new_v4().to_string();
        debug!("Assigning id {} to new feed", id);
        config.id = Some(id);
    }
    config.created_at = existing.and_then(|e| e.created_at).or(Some(now));
    config.updated_at = Some(now);
    config.normalize();
    config
}

/// Opens the on-disk store under the configured data path.
pub fn open_store(config: &AppConfig) -> Result<DiskFeedStore> {
    DiskFeedStore::open(&config.data_path()?.join("feeds"))
}
