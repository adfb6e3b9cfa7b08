use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use shelf_model::{CatalogItem, ItemId, Library, LibraryId, LibraryScan, ScanId};
use tokio::sync::RwLock;

use crate::config::DeletionMode;
use crate::error::{Result, ScanError};
use crate::ports::{
    CatalogRepository, KnownPath, KnownPathPage, LibraryRepository,
    ScanRepository,
};

/// In-process catalog implementing every repository port.
///
/// Used by tests and by `shelfctl` when no database is configured.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

#[derive(Debug, Default)]
struct CatalogState {
    libraries: HashMap<LibraryId, Library>,
    items: HashMap<ItemId, StoredItem>,
    paths: HashMap<(LibraryId, PathBuf), PathEntry>,
    scans: HashMap<ScanId, LibraryScan>,
    upsert_calls: u64,
}

#[derive(Debug, Clone)]
struct StoredItem {
    item: CatalogItem,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct PathEntry {
    item_id: ItemId,
    is_dir: bool,
    size: u64,
    modified: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl CatalogState {
    fn live_paths_of(&self, library_id: LibraryId, item_id: ItemId) -> usize {
        self.paths
            .iter()
            .filter(|((lib, _), entry)| {
                *lib == library_id
                    && entry.item_id == item_id
                    && entry.deleted_at.is_none()
            })
            .count()
    }

    /// Detach `path` from whichever live item other than `owner` holds it.
    fn release_path(
        &mut self,
        library_id: LibraryId,
        path: &Path,
        owner: ItemId,
    ) {
        let key = (library_id, path.to_path_buf());
        let Some(previous) = self.paths.get(&key) else {
            return;
        };
        if previous.item_id == owner || previous.deleted_at.is_some() {
            return;
        }
        let previous_owner = previous.item_id;
        self.paths.remove(&key);
        if let Some(stored) = self.items.get_mut(&previous_owner) {
            stored.item.additional_files.retain(|f| f.path != path);
        }
        if self.live_paths_of(library_id, previous_owner) == 0 {
            self.items.remove(&previous_owner);
        }
    }

    fn remove_path(
        &mut self,
        library_id: LibraryId,
        path: &Path,
        mode: DeletionMode,
        now: DateTime<Utc>,
    ) -> bool {
        let key = (library_id, path.to_path_buf());
        let Some(entry) = self.paths.get_mut(&key) else {
            return false;
        };
        if entry.deleted_at.is_some() {
            return false;
        }
        let owner = entry.item_id;
        match mode {
            DeletionMode::Soft => entry.deleted_at = Some(now),
            DeletionMode::Hard => {
                self.paths.remove(&key);
            }
        }

        if let Some(stored) = self.items.get_mut(&owner) {
            stored.item.additional_files.retain(|f| f.path != path);
        }
        if self.live_paths_of(library_id, owner) == 0 {
            match mode {
                DeletionMode::Soft => {
                    if let Some(stored) = self.items.get_mut(&owner) {
                        stored.deleted_at = Some(now);
                    }
                }
                DeletionMode::Hard => {
                    self.items.remove(&owner);
                }
            }
        }
        true
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live items of a library ordered by path.
    pub async fn live_items(&self, library_id: LibraryId) -> Vec<CatalogItem> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|s| s.item.library_id == library_id && s.deleted_at.is_none())
            .map(|s| s.item.clone())
            .collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        items
    }

    /// Soft-deleted items of a library ordered by path.
    pub async fn deleted_items(&self, library_id: LibraryId) -> Vec<CatalogItem> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|s| s.item.library_id == library_id && s.deleted_at.is_some())
            .map(|s| s.item.clone())
            .collect();
        items.sort_by(|a, b| a.path.cmp(&b.path));
        items
    }

    pub async fn item_by_path(
        &self,
        library_id: LibraryId,
        path: impl AsRef<Path>,
    ) -> Option<CatalogItem> {
        let state = self.state.read().await;
        let entry = state
            .paths
            .get(&(library_id, path.as_ref().to_path_buf()))
            .filter(|entry| entry.deleted_at.is_none())?;
        state.items.get(&entry.item_id).map(|s| s.item.clone())
    }

    /// Number of bulk upserts performed so far.
    pub async fn upsert_calls(&self) -> u64 {
        self.state.read().await.upsert_calls
    }

    pub async fn scans_for(&self, library_id: LibraryId) -> Vec<LibraryScan> {
        let state = self.state.read().await;
        let mut scans: Vec<_> = state
            .scans
            .values()
            .filter(|scan| scan.library_id == library_id)
            .cloned()
            .collect();
        scans.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        scans
    }
}

#[async_trait]
impl LibraryRepository for InMemoryCatalog {
    async fn save_library(&self, library: &Library) -> Result<()> {
        self.state
            .write()
            .await
            .libraries
            .insert(library.id, library.clone());
        Ok(())
    }

    async fn get_library(&self, id: LibraryId) -> Result<Option<Library>> {
        Ok(self.state.read().await.libraries.get(&id).cloned())
    }

    async fn list_libraries(&self) -> Result<Vec<Library>> {
        let state = self.state.read().await;
        let mut libraries: Vec<_> = state.libraries.values().cloned().collect();
        libraries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(libraries)
    }

    async fn mark_scanned(
        &self,
        id: LibraryId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let library = state
            .libraries
            .get_mut(&id)
            .ok_or_else(|| ScanError::NotFound(format!("library {id}")))?;
        library.mark_scanned(at);
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<u64> {
        let mut state = self.state.write().await;
        state.upsert_calls += 1;

        for item in items {
            let library_id = item.library_id;
            let mut claimed: Vec<(PathBuf, bool, u64, Option<DateTime<Utc>>)> =
                vec![(item.path.clone(), item.is_dir, item.size, item.modified)];
            claimed.extend(
                item.additional_files
                    .iter()
                    .map(|f| (f.path.clone(), f.is_dir, f.size, f.modified)),
            );

            // Paths this id held before but no longer claims.
            let stale: Vec<_> = state
                .paths
                .iter()
                .filter(|((lib, path), entry)| {
                    *lib == library_id
                        && entry.item_id == item.id
                        && !claimed.iter().any(|(p, ..)| p == path)
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                state.paths.remove(&key);
            }

            for (path, is_dir, size, modified) in claimed {
                state.release_path(library_id, &path, item.id);
                state.paths.insert(
                    (library_id, path),
                    PathEntry {
                        item_id: item.id,
                        is_dir,
                        size,
                        modified,
                        deleted_at: None,
                    },
                );
            }
            state.items.insert(
                item.id,
                StoredItem {
                    item: item.clone(),
                    deleted_at: None,
                },
            );
        }
        Ok(items.len() as u64)
    }

    fn known_paths(
        &self,
        library_id: LibraryId,
        page_size: usize,
    ) -> BoxStream<'_, Result<KnownPathPage>> {
        Box::pin(async_stream::stream! {
            let known: Vec<KnownPath> = {
                let state = self.state.read().await;
                let mut known: Vec<_> = state
                    .paths
                    .iter()
                    .filter(|((lib, _), entry)| {
                        *lib == library_id && entry.deleted_at.is_none()
                    })
                    .map(|((_, path), entry)| KnownPath {
                        path: path.clone(),
                        item_id: entry.item_id,
                        is_dir: entry.is_dir,
                        size: entry.size,
                        modified: entry.modified,
                    })
                    .collect();
                known.sort_by(|a, b| a.path.cmp(&b.path));
                known
            };
            for page in known.chunks(page_size.max(1)) {
                yield Ok::<_, ScanError>(page.to_vec());
            }
        })
    }

    async fn delete_paths(
        &self,
        library_id: LibraryId,
        paths: &[PathBuf],
        mode: DeletionMode,
    ) -> Result<u64> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let removed = paths
            .iter()
            .filter(|path| state.remove_path(library_id, path, mode, now))
            .count();
        Ok(removed as u64)
    }
}

#[async_trait]
impl ScanRepository for InMemoryCatalog {
    async fn create_scan(&self, scan: &LibraryScan) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .scans
            .values()
            .any(|s| s.library_id == scan.library_id && s.is_active())
        {
            return Err(ScanError::Conflict(format!(
                "library {} already has an active scan",
                scan.library_id
            )));
        }
        state.scans.insert(scan.id, scan.clone());
        Ok(())
    }

    async fn get_scan(&self, id: ScanId) -> Result<Option<LibraryScan>> {
        Ok(self.state.read().await.scans.get(&id).cloned())
    }

    async fn update_scan(&self, scan: &LibraryScan) -> Result<()> {
        let mut state = self.state.write().await;
        let slot = state
            .scans
            .get_mut(&scan.id)
            .ok_or_else(|| ScanError::NotFound(format!("scan {}", scan.id)))?;
        *slot = scan.clone();
        Ok(())
    }

    async fn find_active_scan(
        &self,
        library_id: LibraryId,
    ) -> Result<Option<LibraryScan>> {
        let state = self.state.read().await;
        Ok(state
            .scans
            .values()
            .filter(|s| s.library_id == library_id && s.is_active())
            .max_by_key(|s| (s.created_at, s.id))
            .cloned())
    }

    fn scan_history(
        &self,
        library_id: LibraryId,
    ) -> BoxStream<'_, Result<LibraryScan>> {
        Box::pin(async_stream::stream! {
            let mut scans = self.scans_for(library_id).await;
            scans.reverse();
            for scan in scans {
                yield Ok::<_, ScanError>(scan);
            }
        })
    }

    async fn interrupted_scans(&self) -> Result<Vec<LibraryScan>> {
        let state = self.state.read().await;
        let mut scans: Vec<_> = state
            .scans
            .values()
            .filter(|s| s.is_interrupted())
            .cloned()
            .collect();
        scans.sort_by_key(|s| (s.created_at, s.id));
        Ok(scans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use shelf_model::{FileDescriptor, ItemKind, LocationId};

    fn movie(library_id: LibraryId, path: &str) -> CatalogItem {
        CatalogItem {
            id: ItemId::new(),
            kind: ItemKind::Movie,
            library_id,
            location_id: LocationId::new(),
            parent_id: None,
            title: path.to_string(),
            year: None,
            season_number: None,
            episode_number: None,
            path: path.into(),
            is_dir: false,
            size: 1,
            modified: None,
            additional_files: Vec::new(),
            genres: Vec::new(),
            tags: Vec::new(),
            credits: Vec::new(),
            local_metadata_applied: false,
        }
    }

    #[tokio::test]
    async fn upsert_by_path_never_duplicates() {
        let catalog = InMemoryCatalog::new();
        let library_id = LibraryId::new();
        catalog
            .upsert_items(&[movie(library_id, "/m/a.mkv")])
            .await
            .expect("upsert");
        catalog
            .upsert_items(&[movie(library_id, "/m/a.mkv")])
            .await
            .expect("upsert");

        assert_eq!(catalog.live_items(library_id).await.len(), 1);
        assert_eq!(catalog.upsert_calls().await, 2);
    }

    #[tokio::test]
    async fn known_paths_include_additional_parts_and_page() {
        let catalog = InMemoryCatalog::new();
        let library_id = LibraryId::new();
        let mut item = movie(library_id, "/m/Heat cd1.mkv");
        item.additional_files =
            vec![FileDescriptor::file("/m/Heat cd2.mkv", 1, None)];
        let owner = item.id;
        catalog
            .upsert_items(&[item, movie(library_id, "/m/z.mkv")])
            .await
            .expect("upsert");

        let pages: Vec<_> = catalog
            .known_paths(library_id, 2)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()
            .expect("pages");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].len(), 2);
        assert!(pages[0].iter().all(|k| k.item_id == owner));
    }

    #[tokio::test]
    async fn soft_and_hard_deletes() {
        let catalog = InMemoryCatalog::new();
        let library_id = LibraryId::new();
        catalog
            .upsert_items(&[
                movie(library_id, "/m/a.mkv"),
                movie(library_id, "/m/b.mkv"),
            ])
            .await
            .expect("upsert");

        let removed = catalog
            .delete_paths(library_id, &["/m/a.mkv".into()], DeletionMode::Soft)
            .await
            .expect("soft delete");
        assert_eq!(removed, 1);
        assert_eq!(catalog.deleted_items(library_id).await.len(), 1);

        let removed = catalog
            .delete_paths(
                library_id,
                &["/m/a.mkv".into(), "/m/b.mkv".into()],
                DeletionMode::Hard,
            )
            .await
            .expect("hard delete");
        assert_eq!(removed, 1);
        assert!(catalog.live_items(library_id).await.is_empty());
    }

    #[tokio::test]
    async fn only_one_active_scan_per_library() {
        let catalog = InMemoryCatalog::new();
        let library_id = LibraryId::new();
        let first = LibraryScan::pending(library_id);
        catalog.create_scan(&first).await.expect("first");

        let second = LibraryScan::pending(library_id);
        assert!(matches!(
            catalog.create_scan(&second).await,
            Err(ScanError::Conflict(_))
        ));

        let mut finished = first.clone();
        finished.mark_completed();
        catalog.update_scan(&finished).await.expect("update");
        catalog.create_scan(&second).await.expect("second after finish");

        let history: Vec<_> = catalog.scan_history(library_id).collect().await;
        assert_eq!(history.len(), 2);
    }
}
