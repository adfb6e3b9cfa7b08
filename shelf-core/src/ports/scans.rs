use async_trait::async_trait;
use futures::stream::BoxStream;
use shelf_model::{LibraryId, LibraryScan, ScanId};

use crate::error::Result;

/// Repository port for persisted scan records.
#[async_trait]
pub trait ScanRepository: Send + Sync {
    /// Insert a new scan. Fails with `Conflict` when the library already has
    /// an active (pending or running) scan.
    async fn create_scan(&self, scan: &LibraryScan) -> Result<()>;

    async fn get_scan(&self, id: ScanId) -> Result<Option<LibraryScan>>;

    /// Overwrite status, counters and checkpoint of an existing scan.
    async fn update_scan(&self, scan: &LibraryScan) -> Result<()>;

    async fn find_active_scan(
        &self,
        library_id: LibraryId,
    ) -> Result<Option<LibraryScan>>;

    /// Every scan of a library, newest first.
    fn scan_history(
        &self,
        library_id: LibraryId,
    ) -> BoxStream<'_, Result<LibraryScan>>;

    /// Scans left `Running` with a checkpoint, across all libraries.
    async fn interrupted_scans(&self) -> Result<Vec<LibraryScan>>;
}
