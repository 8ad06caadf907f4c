//! Metadata cache for the FUSE layer
//!
//! Uses moka for concurrent caching with TTL and size-based eviction.
//! File handles report commits and truncates through [`UpdateListener`],
//! which drops the stale record.

use std::time::Duration;

use grid_store::GridFileRecord;
use moka::sync::Cache;

use crate::config::CacheConfig;
use crate::file::UpdateListener;

/// Latest file record per path
#[derive(Clone)]
pub struct MetadataCache {
    records: Cache<String, GridFileRecord>,
}

impl MetadataCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            records: Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(Duration::from_secs(config.ttl_secs))
                .build(),
        }
    }

    pub fn get(&self, path: &str) -> Option<GridFileRecord> {
        self.records.get(path)
    }

    pub fn put(&self, path: &str, record: GridFileRecord) {
        self.records.insert(path.to_string(), record);
    }

    pub fn invalidate(&self, path: &str) {
        self.records.invalidate(path);
    }

    pub fn invalidate_all(&self) {
        self.records.invalidate_all();
    }
}

impl UpdateListener for MetadataCache {
    fn synchronize_update(&self, path: &str) {
        tracing::debug!(path, "invalidating cached metadata");
        self.invalidate(path);
    }
}
