use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use shelf_model::LibraryId;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::pipeline::{ItemStream, ScanContext, ScanWorkItem, Stage};
use crate::ports::CatalogRepository;

pub use crate::ports::KnownPath;

/// Catalog paths for one library captured at scan start.
///
/// Observed paths are removed as the walk reaches them; whatever is left
/// once the pipeline drains is the set of paths that no longer exist.
#[derive(Debug)]
pub struct KnownPathSnapshot {
    library_id: LibraryId,
    loaded: usize,
    residual: Mutex<HashMap<PathBuf, KnownPath>>,
}

impl KnownPathSnapshot {
    pub fn new(
        library_id: LibraryId,
        entries: impl IntoIterator<Item = (PathBuf, KnownPath)>,
    ) -> Self {
        let residual: HashMap<_, _> = entries.into_iter().collect();
        Self {
            library_id,
            loaded: residual.len(),
            residual: Mutex::new(residual),
        }
    }

    pub fn library_id(&self) -> LibraryId {
        self.library_id
    }

    /// Number of paths the catalog held when the scan started.
    pub fn loaded(&self) -> usize {
        self.loaded
    }

    pub async fn remaining(&self) -> usize {
        self.residual.lock().await.len()
    }

    /// Mark `path` as seen, returning its catalog record if it had one.
    pub async fn observe(&self, path: &Path) -> Option<KnownPath> {
        self.residual.lock().await.remove(path)
    }

    /// Drain every path that was never observed, in path order.
    pub async fn take_unobserved(&self) -> Vec<(PathBuf, KnownPath)> {
        let mut residual = self.residual.lock().await;
        let mut out: Vec<_> = residual.drain().collect();
        residual.shrink_to_fit();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Release capacity left behind by observed entries.
    pub async fn compact(&self) {
        self.residual.lock().await.shrink_to_fit();
    }
}

/// Process-wide registry of per-library snapshots. A snapshot is loaded once
/// per scan and released explicitly when the scan ends.
#[derive(Debug, Default)]
pub struct KnownPathCache {
    snapshots: DashMap<LibraryId, Arc<KnownPathSnapshot>>,
}

impl KnownPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(
        &self,
        library_id: LibraryId,
        catalog: &dyn CatalogRepository,
        page_size: usize,
    ) -> Result<Arc<KnownPathSnapshot>> {
        let mut entries = Vec::new();
        let mut pages = catalog.known_paths(library_id, page_size);
        let mut page_count = 0usize;
        while let Some(page) = pages.next().await {
            let page = page?;
            page_count += 1;
            entries.extend(page.into_iter().map(|known| {
                let path = known.path.clone();
                (path, known)
            }));
        }

        let snapshot = Arc::new(KnownPathSnapshot::new(library_id, entries));
        info!(
            target: "scan::changes",
            library_id = %library_id,
            known_paths = snapshot.loaded(),
            pages = page_count,
            "loaded known path snapshot"
        );
        self.snapshots.insert(library_id, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn get(&self, library_id: LibraryId) -> Option<Arc<KnownPathSnapshot>> {
        self.snapshots
            .get(&library_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn release(&self, library_id: LibraryId) -> bool {
        let released = self.snapshots.remove(&library_id).is_some();
        if released {
            debug!(
                target: "scan::changes",
                library_id = %library_id,
                "released known path snapshot"
            );
        }
        released
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Annotates each entry with its catalog record and flags entries whose
/// recorded size and modification time still match.
#[derive(Debug)]
pub struct ChangeDetectionStage {
    snapshot: Arc<KnownPathSnapshot>,
}

impl ChangeDetectionStage {
    pub fn new(snapshot: Arc<KnownPathSnapshot>) -> Self {
        Self { snapshot }
    }
}

impl Stage<ScanWorkItem, ScanWorkItem> for ChangeDetectionStage {
    fn name(&self) -> &'static str {
        "change_detection"
    }

    fn apply(
        &self,
        input: ItemStream<ScanWorkItem>,
        _ctx: Arc<ScanContext>,
        cancel: CancellationToken,
    ) -> ItemStream<ScanWorkItem> {
        let snapshot = Arc::clone(&self.snapshot);
        Box::pin(async_stream::stream! {
            let mut input = input;
            while let Some(mut item) = input.next().await {
                if cancel.is_cancelled() {
                    return;
                }
                if !item.is_root {
                    let known = snapshot.observe(&item.file.path).await;
                    item.unchanged = item.replayed
                        || known
                            .as_ref()
                            .is_some_and(|known| known.matches(&item.file));
                    item.known = known;
                }
                yield item;
            }
        })
    }
}
