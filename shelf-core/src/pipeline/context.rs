use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use shelf_model::{Library, LibraryScan, LocationId, ScanId};

use crate::config::ScanPipelineConfig;

use super::checkpoint::ScanCheckpoint;

/// Scan-wide state shared by every stage of one run.
#[derive(Debug)]
pub struct ScanContext {
    pub library: Arc<Library>,
    /// Scan record as it was when the pipeline was built.
    pub scan: LibraryScan,
    pub checkpoint: Option<ScanCheckpoint>,
    pub config: Arc<ScanPipelineConfig>,
    /// Directories that could not be enumerated this run. Catalog rows beneath
    /// them were not observed and must survive reconciliation.
    unreachable: Mutex<Vec<PathBuf>>,
}

impl ScanContext {
    pub fn new(
        library: Arc<Library>,
        scan: LibraryScan,
        checkpoint: Option<ScanCheckpoint>,
        config: Arc<ScanPipelineConfig>,
    ) -> Self {
        Self {
            library,
            scan,
            checkpoint,
            config,
            unreachable: Mutex::new(Vec::new()),
        }
    }

    pub fn scan_id(&self) -> ScanId {
        self.scan.id
    }

    pub fn location_ids(&self) -> Vec<LocationId> {
        self.library.locations.iter().map(|loc| loc.id).collect()
    }

    pub fn mark_unreachable(&self, path: impl Into<PathBuf>) {
        self.unreachable
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(path.into());
    }

    /// True if `path` lies at or beneath a directory that was unreadable.
    pub fn is_unreachable(&self, path: &Path) -> bool {
        self.unreachable
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .iter()
            .any(|root| path.starts_with(root))
    }

    pub fn unreachable_count(&self) -> usize {
        self.unreachable
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }
}
