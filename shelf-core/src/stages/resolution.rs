use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use shelf_model::ItemId;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::pipeline::{ItemStream, ScanContext, ScanWorkItem, Stage};
use crate::resolve::{AncestorCache, ResolveRequest, ResolverChain};

/// Runs the resolver chain over every changed entry, in traversal order.
///
/// Resolved directories are remembered in the ancestor cache so their
/// descendants can see them. Unchanged files skip resolution but still keep
/// their ancestors warm; unchanged directories are resolved again, reusing
/// their catalog id, purely to rebuild that context.
///
/// Catalog ids of unchanged files in the directory being walked are handed to
/// resolvers, so a new file can be written into an existing sibling's item.
pub struct ResolutionStage {
    resolvers: Arc<ResolverChain>,
    ancestors: Arc<Mutex<AncestorCache>>,
}

impl std::fmt::Debug for ResolutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionStage")
            .field("resolvers", &self.resolvers)
            .finish_non_exhaustive()
    }
}

impl ResolutionStage {
    pub fn new(
        resolvers: Arc<ResolverChain>,
        ancestors: Arc<Mutex<AncestorCache>>,
    ) -> Self {
        Self {
            resolvers,
            ancestors,
        }
    }
}

/// Unchanged files of one directory, reset whenever the walk moves on.
#[derive(Debug, Default)]
struct UnchangedSiblings {
    dir: Option<PathBuf>,
    ids: HashMap<PathBuf, ItemId>,
}

impl UnchangedSiblings {
    fn enter(&mut self, path: &Path) {
        let dir = path.parent();
        if self.dir.as_deref() != dir {
            self.dir = dir.map(Path::to_path_buf);
            self.ids.clear();
        }
    }
}

fn note_processed(cache: &mut AncestorCache) {
    if let Some(evicted) = cache.record_processed() {
        debug!(
            target: "scan::resolve",
            evicted,
            retained = cache.len(),
            "pruned ancestor cache"
        );
    }
}

impl Stage<ScanWorkItem, ScanWorkItem> for ResolutionStage {
    fn name(&self) -> &'static str {
        "resolution"
    }

    fn apply(
        &self,
        input: ItemStream<ScanWorkItem>,
        ctx: Arc<ScanContext>,
        cancel: CancellationToken,
    ) -> ItemStream<ScanWorkItem> {
        let resolvers = Arc::clone(&self.resolvers);
        let ancestors = Arc::clone(&self.ancestors);
        Box::pin(async_stream::stream! {
            let mut input = input;
            let mut unchanged_siblings = UnchangedSiblings::default();
            while let Some(mut item) = input.next().await {
                if cancel.is_cancelled() {
                    return;
                }

                if !item.file.is_dir {
                    unchanged_siblings.enter(&item.file.path);
                }
                if item.unchanged && !item.file.is_dir {
                    if let Some(known) = item.known.as_ref() {
                        unchanged_siblings
                            .ids
                            .insert(item.file.path.clone(), known.item_id);
                    }
                    let mut cache = ancestors.lock().await;
                    cache.touch(&item.file.path);
                    note_processed(&mut cache);
                    drop(cache);
                    yield item;
                    continue;
                }

                let chain = ancestors.lock().await.chain_for(&item.file.path);
                let outcome = {
                    let request = ResolveRequest {
                        file: &item.file,
                        library_id: ctx.library.id,
                        library_type: ctx.library.library_type,
                        location_id: item.location_id,
                        location_root: &item.location_root,
                        is_root: item.is_root,
                        children: item.children.as_deref(),
                        siblings: item.siblings.as_deref(),
                        ancestors: &chain,
                        unchanged_siblings: Some(&unchanged_siblings.ids),
                        config: &ctx.config,
                    };
                    resolvers.resolve(&request).await
                };

                let mut cache = ancestors.lock().await;
                match outcome {
                    Ok(Some(mut resolved)) => {
                        // Items resolved into another path keep the id the
                        // resolver chose for them.
                        if let Some(known) = item.known.as_ref()
                            && resolved.file.path == item.file.path
                        {
                            resolved.id = Some(known.item_id);
                        }
                        if resolved.parent_id.is_none() {
                            resolved.parent_id =
                                chain.last().and_then(|parent| parent.item.id);
                        }
                        if item.file.is_dir {
                            // Descendants link to this id before the batch
                            // holding it is flushed.
                            resolved.id.get_or_insert_with(ItemId::new);
                            cache.insert(resolved.clone(), item.file.clone());
                        }
                        item.resolved = Some(resolved);
                    }
                    Ok(None) => {
                        debug!(
                            target: "scan::resolve",
                            path = %item.file.path.display(),
                            "no resolver claimed entry"
                        );
                    }
                    Err(err) => {
                        warn!(
                            target: "scan::resolve",
                            path = %item.file.path.display(),
                            error = %err,
                            "resolver failed; skipping entry"
                        );
                    }
                }
                note_processed(&mut cache);
                drop(cache);
                yield item;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanPipelineConfig;
    use crate::fs::InMemoryFs;
    use crate::pipeline::Pipeline;
    use crate::stages::DirectoryTraversalStage;
    use shelf_model::{ItemKind, Library, LibraryScan, LibraryType};

    async fn resolve_tree(
        fs: InMemoryFs,
        library: Library,
        prune_interval: usize,
    ) -> Vec<ScanWorkItem> {
        let scan = LibraryScan::pending(library.id);
        let ctx = Arc::new(ScanContext::new(
            Arc::new(library),
            scan,
            None,
            Arc::new(ScanPipelineConfig::default()),
        ));
        let locations = ctx.library.locations.clone();
        Pipeline::from_iter(locations, ctx, CancellationToken::new())
            .then(DirectoryTraversalStage::new(Arc::new(fs)))
            .then(ResolutionStage::new(
                Arc::new(ResolverChain::with_defaults()),
                Arc::new(Mutex::new(AncestorCache::new(prune_interval))),
            ))
            .into_stream()
            .collect()
            .await
    }

    #[tokio::test]
    async fn episodes_link_to_seasons_and_series() {
        let fs = InMemoryFs::new();
        fs.add_file("/tv/Show/Season 1/Show S01E01.mkv", 1);
        fs.add_file("/tv/Show/Season 1/Show S01E02.mkv", 1);
        fs.add_file("/tv/Show/Season 1/notes.txt", 1);

        let library =
            Library::new("TV", LibraryType::Series, vec!["/tv".into()]);
        let items = resolve_tree(fs, library, 1_000).await;

        let resolved: Vec<_> =
            items.iter().filter_map(|i| i.resolved.as_ref()).collect();
        let kinds: Vec<_> = resolved.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ItemKind::Series,
                ItemKind::Season,
                ItemKind::Episode,
                ItemKind::Episode
            ]
        );
        assert!(resolved[0].id.is_some());
        assert_eq!(resolved[1].parent_id, resolved[0].id);
        assert_eq!(resolved[2].parent_id, resolved[1].id);
        assert_eq!(resolved[3].parent_id, resolved[1].id);

        // Root, the text file and nothing else stay unresolved.
        assert_eq!(items.iter().filter(|i| i.resolved.is_none()).count(), 2);
    }

    #[tokio::test]
    async fn aggressive_pruning_never_loses_active_ancestors() {
        let fs = InMemoryFs::new();
        for show in ["A", "B"] {
            for ep in 1..=6 {
                fs.add_file(
                    format!("/tv/{show}/Season 1/{show} S01E{ep:02}.mkv"),
                    1,
                );
            }
        }

        let library =
            Library::new("TV", LibraryType::Series, vec!["/tv".into()]);
        let items = resolve_tree(fs, library, 2).await;

        let episodes: Vec<_> = items
            .iter()
            .filter_map(|i| i.resolved.as_ref())
            .filter(|r| r.kind == ItemKind::Episode)
            .collect();
        assert_eq!(episodes.len(), 12);
        assert!(episodes.iter().all(|e| e.parent_id.is_some()));
    }
}
