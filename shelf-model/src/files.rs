use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Lightweight filesystem facts captured for one entry during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl FileDescriptor {
    pub fn file(
        path: impl Into<PathBuf>,
        size: u64,
        modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size,
            modified,
        }
    }

    pub fn directory(
        path: impl Into<PathBuf>,
        modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            size: 0,
            modified,
        }
    }

    /// Final path component, lossily converted.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File stem (name without extension), lossily converted.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }
}
