use async_trait::async_trait;
use shelf_model::LibraryId;

use crate::error::Result;

/// Per-library deduplication cache kept by downstream consumers (for
/// example an enrichment worker collapsing repeated refreshes). Cleared once a
/// scan ends so the next run starts fresh.
#[async_trait]
pub trait DedupeCache: Send + Sync {
    async fn clear(&self, library_id: LibraryId) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDedupeCache;

#[async_trait]
impl DedupeCache for NoopDedupeCache {
    async fn clear(&self, _library_id: LibraryId) -> Result<()> {
        Ok(())
    }
}
