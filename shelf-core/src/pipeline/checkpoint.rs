//! Resume checkpoints persisted on the scan record.
//!
//! The record stores a stage name, an opaque cursor and a format version. Each
//! stage owns the shape of its cursor; an unknown stage or version is treated
//! as "no checkpoint" so a resumed scan simply restarts from the beginning.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shelf_model::{LibraryScan, LocationId};
use tracing::warn;

use crate::error::Result;

pub const CHECKPOINT_VERSION: i32 = 1;

pub const TRAVERSAL_STAGE: &str = "traversal";

/// Position inside the depth-first walk: everything at or before `path`
/// within `location_id` (and every earlier location) has been flushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalCursor {
    pub location_id: LocationId,
    pub path: PathBuf,
}

impl TraversalCursor {
    pub fn new(location_id: LocationId, path: impl Into<PathBuf>) -> Self {
        Self {
            location_id,
            path: path.into(),
        }
    }
}

/// Stage-tagged cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageCursor {
    Traversal(TraversalCursor),
}

impl StageCursor {
    pub fn stage_name(&self) -> &'static str {
        match self {
            StageCursor::Traversal(_) => TRAVERSAL_STAGE,
        }
    }

    fn encode(&self) -> Result<String> {
        Ok(match self {
            StageCursor::Traversal(cursor) => serde_json::to_string(cursor)?,
        })
    }

    fn decode(stage: &str, raw: &str) -> Option<Self> {
        match stage {
            TRAVERSAL_STAGE => serde_json::from_str(raw)
                .map(StageCursor::Traversal)
                .map_err(|err| {
                    warn!(
                        target: "scan::checkpoint",
                        stage,
                        error = %err,
                        "discarding unreadable resume cursor"
                    );
                })
                .ok(),
            other => {
                warn!(
                    target: "scan::checkpoint",
                    stage = other,
                    "discarding cursor for unknown stage"
                );
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCheckpoint {
    pub cursor: StageCursor,
    pub version: i32,
}

impl ScanCheckpoint {
    pub fn traversal(location_id: LocationId, path: impl Into<PathBuf>) -> Self {
        Self {
            cursor: StageCursor::Traversal(TraversalCursor::new(
                location_id,
                path,
            )),
            version: CHECKPOINT_VERSION,
        }
    }

    /// Reconstruct the checkpoint stored on a scan record, if usable.
    pub fn from_scan(scan: &LibraryScan) -> Option<Self> {
        let (stage, raw) =
            match (scan.current_stage.as_deref(), scan.resume_cursor.as_deref())
            {
                (Some(stage), Some(raw)) => (stage, raw),
                _ => return None,
            };

        match scan.checkpoint_version {
            Some(CHECKPOINT_VERSION) => {}
            other => {
                warn!(
                    target: "scan::checkpoint",
                    scan_id = %scan.id,
                    version = ?other,
                    expected = CHECKPOINT_VERSION,
                    "ignoring checkpoint with unsupported version"
                );
                return None;
            }
        }

        StageCursor::decode(stage, raw).map(|cursor| Self {
            cursor,
            version: CHECKPOINT_VERSION,
        })
    }

    /// Write this checkpoint onto the scan record.
    pub fn apply_to(&self, scan: &mut LibraryScan) -> Result<()> {
        scan.current_stage = Some(self.cursor.stage_name().to_string());
        scan.resume_cursor = Some(self.cursor.encode()?);
        scan.checkpoint_version = Some(self.version);
        Ok(())
    }

    pub fn traversal_cursor(&self) -> Option<&TraversalCursor> {
        match &self.cursor {
            StageCursor::Traversal(cursor) => Some(cursor),
        }
    }

    /// True when `path` in `location_index` sits at or before the cursor in
    /// traversal order. `locations` lists location ids in library order.
    pub fn covers(
        &self,
        locations: &[LocationId],
        location_index: usize,
        path: &Path,
    ) -> bool {
        let Some(cursor) = self.traversal_cursor() else {
            return false;
        };
        let Some(cursor_index) =
            locations.iter().position(|id| *id == cursor.location_id)
        else {
            return false;
        };
        match location_index.cmp(&cursor_index) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => path <= cursor.path.as_path(),
            std::cmp::Ordering::Greater => false,
        }
    }
}
