use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use shelf_model::{CatalogItem, FileDescriptor, ItemId, LibraryId};

use crate::config::DeletionMode;
use crate::error::Result;

/// Catalog facts for one stored path, used to detect changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPath {
    pub path: PathBuf,
    /// Item owning this path. Extra parts of a multi-part item point at the
    /// item that owns the primary file.
    pub item_id: ItemId,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl KnownPath {
    /// Directories match on existence alone. Files also compare size and
    /// modification time; times are compared at millisecond precision since
    /// stores may truncate sub-millisecond digits.
    pub fn matches(&self, file: &FileDescriptor) -> bool {
        if self.is_dir != file.is_dir {
            return false;
        }
        if self.is_dir {
            return true;
        }
        self.size == file.size
            && self.modified.map(|t| t.timestamp_millis())
                == file.modified.map(|t| t.timestamp_millis())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub type KnownPathPage = Vec<KnownPath>;

/// Repository port for catalog items produced by scans.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Insert or replace a batch of flattened items in one round trip.
    ///
    /// Items are keyed by id; a path already owned by another live item is
    /// reassigned so no path is ever stored twice. Returns rows written.
    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<u64>;

    /// Stream every live path of a library in pages of at most `page_size`.
    fn known_paths(
        &self,
        library_id: LibraryId,
        page_size: usize,
    ) -> BoxStream<'_, Result<KnownPathPage>>;

    /// Delete the given paths. Items left without any live path are deleted
    /// too. Returns the number of paths removed.
    async fn delete_paths(
        &self,
        library_id: LibraryId,
        paths: &[PathBuf],
        mode: DeletionMode,
    ) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_match_ignores_sub_millisecond_drift() {
        let stored = Utc.timestamp_opt(1_700_000_000, 123_000_000).single();
        let observed = Utc.timestamp_opt(1_700_000_000, 123_456_789).single();
        let known = KnownPath {
            path: "/m/a.mkv".into(),
            item_id: ItemId::new(),
            is_dir: false,
            size: 5,
            modified: stored,
        };

        assert!(known.matches(&FileDescriptor::file("/m/a.mkv", 5, observed)));
        assert!(!known.matches(&FileDescriptor::file("/m/a.mkv", 6, observed)));
        assert!(!known.matches(&FileDescriptor::directory("/m/a.mkv", None)));
    }

    #[test]
    fn directories_match_on_existence() {
        let known = KnownPath {
            path: "/tv/Show".into(),
            item_id: ItemId::new(),
            is_dir: true,
            size: 0,
            modified: None,
        };
        let later = Utc.timestamp_opt(1_800_000_000, 0).single();
        assert!(known.matches(&FileDescriptor::directory("/tv/Show", later)));
    }
}
