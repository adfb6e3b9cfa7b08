//! Local metadata extraction from sidecar files next to media.

pub mod nfo;

use async_trait::async_trait;
use shelf_model::{Credit, FileDescriptor, MetadataItem};

use crate::error::Result;

pub use nfo::NfoExtractor;

/// Credits, genres and tags discovered without any network access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalMetadata {
    pub credits: Vec<Credit>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    /// A local source was actually read for the item.
    pub applied: bool,
}

impl LocalMetadata {
    pub fn is_empty(&self) -> bool {
        self.credits.is_empty() && self.genres.is_empty() && self.tags.is_empty()
    }

    /// Merge into `item`, skipping values it already carries.
    pub fn apply_to(self, item: &mut MetadataItem) {
        for genre in self.genres {
            if !item.genres.iter().any(|g| g.eq_ignore_ascii_case(&genre)) {
                item.genres.push(genre);
            }
        }
        for tag in self.tags {
            if !item.tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
                item.tags.push(tag);
            }
        }
        for credit in self.credits {
            if !item.credits.contains(&credit) {
                item.credits.push(credit);
            }
        }
        item.local_metadata_applied |= self.applied;
    }
}

/// Reads local metadata for a resolved item.
///
/// `candidates` holds the entries a sidecar may live in: a directory's own
/// listing, or the listing of the directory holding a file.
#[async_trait]
pub trait LocalExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when this extractor found nothing to contribute.
    async fn extract(
        &self,
        item: &MetadataItem,
        candidates: &[FileDescriptor],
    ) -> Result<Option<LocalMetadata>>;
}
