use std::path::Path;
use std::sync::Arc;

use shelf_model::{FileDescriptor, LocationId, MetadataItem};

use crate::stages::change_detection::KnownPath;

/// One filesystem entry travelling through the pipeline.
#[derive(Debug, Clone)]
pub struct ScanWorkItem {
    pub file: FileDescriptor,
    pub location_id: LocationId,
    pub location_root: Arc<Path>,
    /// The location root itself.
    pub is_root: bool,
    /// Directory listing, for directories that could be enumerated.
    pub children: Option<Arc<[FileDescriptor]>>,
    /// Parent directory listing (includes this entry).
    pub siblings: Option<Arc<[FileDescriptor]>>,
    /// Catalog record for this path from before the scan started.
    pub known: Option<KnownPath>,
    /// Matches the catalog record; nothing to write.
    pub unchanged: bool,
    /// Sits before the resume cursor and was flushed by an earlier attempt.
    pub replayed: bool,
    pub resolved: Option<MetadataItem>,
}

impl ScanWorkItem {
    pub fn new(
        file: FileDescriptor,
        location_id: LocationId,
        location_root: Arc<Path>,
    ) -> Self {
        Self {
            file,
            location_id,
            location_root,
            is_root: false,
            children: None,
            siblings: None,
            known: None,
            unchanged: false,
            replayed: false,
            resolved: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn is_dir(&self) -> bool {
        self.file.is_dir
    }

    /// Entries a sidecar lookup should consider: a directory's own listing,
    /// or the listing a file lives in.
    pub fn sidecar_candidates(&self) -> &[FileDescriptor] {
        let listing = if self.file.is_dir {
            self.children.as_deref()
        } else {
            self.siblings.as_deref()
        };
        listing.unwrap_or(&[])
    }
}
