//! Resolver chain turning filesystem entries into typed metadata items.

pub mod ancestors;
pub mod builtin;
pub mod naming;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use shelf_model::{
    FileDescriptor, ItemId, ItemKind, LibraryId, LibraryType, LocationId,
    MetadataItem,
};
use tracing::debug;

use crate::config::ScanPipelineConfig;
use crate::error::Result;

pub use ancestors::{AncestorCache, CachedAncestor};
pub use builtin::{EpisodeResolver, MovieResolver, SeasonResolver, SeriesResolver};

/// Everything a resolver may inspect for one entry.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub file: &'a FileDescriptor,
    pub library_id: LibraryId,
    pub library_type: LibraryType,
    pub location_id: LocationId,
    pub location_root: &'a Path,
    pub is_root: bool,
    /// Directory listing, when the entry is a directory.
    pub children: Option<&'a [FileDescriptor]>,
    /// Listing of the directory holding the entry.
    pub siblings: Option<&'a [FileDescriptor]>,
    /// Resolved ancestors, root-first.
    pub ancestors: &'a [Arc<CachedAncestor>],
    /// Catalog ids of unchanged files already walked in this directory.
    pub unchanged_siblings: Option<&'a HashMap<PathBuf, ItemId>>,
    pub config: &'a ScanPipelineConfig,
}

impl<'a> ResolveRequest<'a> {
    /// Resolved item of the directory directly containing this entry.
    pub fn parent(&self) -> Option<&'a CachedAncestor> {
        let parent_path = self.file.path.parent()?;
        self.ancestors
            .last()
            .filter(|ancestor| ancestor.file.path == parent_path)
            .map(Arc::as_ref)
    }

    /// Nearest resolved ancestor of the given kind.
    pub fn nearest(&self, kind: ItemKind) -> Option<&'a CachedAncestor> {
        self.ancestors
            .iter()
            .rev()
            .find(|ancestor| ancestor.item.kind == kind)
            .map(Arc::as_ref)
    }

    /// Catalog id of an unchanged sibling file, if the walk has passed it.
    pub fn unchanged_sibling(&self, path: &Path) -> Option<ItemId> {
        self.unchanged_siblings?.get(path).copied()
    }

    pub fn is_media_file(&self) -> bool {
        !self.file.is_dir
            && self
                .file
                .extension()
                .is_some_and(|ext| self.config.is_media_extension(&ext))
    }

    /// Path components between the location root and the entry.
    pub fn relative_components(&self) -> Vec<String> {
        self.file
            .path
            .strip_prefix(self.location_root)
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Skeleton item bound to this entry's library and location.
    pub fn item(&self, kind: ItemKind, title: impl Into<String>) -> MetadataItem {
        MetadataItem::new(
            kind,
            self.library_id,
            self.location_id,
            self.file.clone(),
            title,
        )
    }
}

/// One strategy for classifying an entry.
///
/// `Ok(None)` defers to the next resolver in the chain. Errors are logged by
/// the resolution stage and the entry is skipped.
#[async_trait]
pub trait Resolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs first.
    fn order(&self) -> i32 {
        0
    }

    fn supports(&self, _library_type: LibraryType) -> bool {
        true
    }

    async fn resolve(
        &self,
        request: &ResolveRequest<'_>,
    ) -> Result<Option<MetadataItem>>;
}

/// Ordered resolvers; the first non-empty result wins. Resolvers with equal
/// order keep their registration order.
#[derive(Clone, Default)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.resolvers.iter().map(|r| (r.name(), r.order())))
            .finish()
    }
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Movie and series/season/episode resolvers.
    pub fn with_defaults() -> Self {
        Self::new()
            .with(SeriesResolver)
            .with(SeasonResolver)
            .with(EpisodeResolver)
            .with(MovieResolver)
    }

    pub fn with<R: Resolver + 'static>(mut self, resolver: R) -> Self {
        self.register(Arc::new(resolver));
        self
    }

    pub fn register(&mut self, resolver: Arc<dyn Resolver>) {
        self.resolvers.push(resolver);
        self.resolvers.sort_by_key(|r| r.order());
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub async fn resolve(
        &self,
        request: &ResolveRequest<'_>,
    ) -> Result<Option<MetadataItem>> {
        for resolver in self
            .resolvers
            .iter()
            .filter(|r| r.supports(request.library_type))
        {
            if let Some(item) = resolver.resolve(request).await? {
                debug!(
                    target: "scan::resolve",
                    resolver = resolver.name(),
                    path = %request.file.path.display(),
                    kind = %item.kind,
                    "entry resolved"
                );
                return Ok(Some(item));
            }
        }
        Ok(None)
    }
}
