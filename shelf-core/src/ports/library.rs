use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelf_model::{Library, LibraryId};

use crate::error::Result;

/// Repository port for library definitions.
#[async_trait]
pub trait LibraryRepository: Send + Sync {
    /// Create or replace a library and its locations.
    async fn save_library(&self, library: &Library) -> Result<()>;

    async fn get_library(&self, id: LibraryId) -> Result<Option<Library>>;

    async fn list_libraries(&self) -> Result<Vec<Library>>;

    /// Record the completion time of the latest successful scan.
    async fn mark_scanned(&self, id: LibraryId, at: DateTime<Utc>)
    -> Result<()>;
}
