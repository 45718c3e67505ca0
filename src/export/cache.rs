use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use super::metadata::ExportMetadata;

/// A serialized export held for reuse: the final response body plus the
/// metadata generated alongside it.
#[derive(Debug)]
pub struct CachedExport {
    pub body: Vec<u8>,
    pub metadata: ExportMetadata,
}

/// Export cache seam. The in-process implementation below is per-instance
/// state; a multi-instance deployment would back this with a shared store.
#[async_trait]
pub trait ExportCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Arc<CachedExport>>;
    async fn store(&self, key: String, export: Arc<CachedExport>);
}

/// In-memory export cache with a fixed TTL and bounded entry count.
pub struct MemoryExportCache {
    inner: Cache<String, Arc<CachedExport>>,
}

impl MemoryExportCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        MemoryExportCache {
            inner: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_entries)
                .build(),
        }
    }
}

#[async_trait]
impl ExportCache for MemoryExportCache {
    async fn get(&self, key: &str) -> Option<Arc<CachedExport>> {
        self.inner.get(key).await
    }

    async fn store(&self, key: String, export: Arc<CachedExport>) {
        self.inner.insert(key, export).await;
        // sweep expired entries at write time instead of letting them linger
        self.inner.run_pending_tasks().await;
    }
}
