//! Batch buffering and tree flattening ahead of bulk inserts.

use std::collections::HashSet;

use shelf_model::{CatalogItem, ItemId, ItemKind, MetadataItem};

use crate::pipeline::ScanWorkItem;

/// Resolved items waiting for the next bulk insert.
#[derive(Debug)]
pub struct PendingBatch {
    items: Vec<ScanWorkItem>,
    capacity: usize,
}

impl PendingBatch {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: ScanWorkItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn take(&mut self) -> Vec<ScanWorkItem> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.capacity))
    }

    /// Drop buffered items without writing them.
    pub fn discard(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        dropped
    }
}

/// Rows ready for one bulk insert plus the counter deltas they represent.
#[derive(Debug, Default)]
pub struct FlattenedBatch {
    pub rows: Vec<CatalogItem>,
    /// Top-level items whose path was not in the catalog before the scan.
    pub added: u64,
    /// Top-level items written under an existing catalog id, including items
    /// another entry was folded into.
    pub updated: u64,
    /// Distinct written items for enrichment, in insertion order.
    pub refresh: Vec<(ItemId, ItemKind)>,
}

/// Flatten every resolved tree in `items`, assigning ids where missing and
/// linking nested children to their parent.
pub fn flatten_batch(items: Vec<ScanWorkItem>) -> FlattenedBatch {
    let mut batch = FlattenedBatch::default();
    let mut seen = HashSet::new();

    for work in items {
        let Some(resolved) = work.resolved else {
            continue;
        };
        // Resolving into another path's item means that item already exists.
        if work.known.is_some() || resolved.file.path != work.file.path {
            batch.updated += 1;
        } else {
            batch.added += 1;
        }
        flatten_into(resolved, &mut batch.rows);
    }

    for row in &batch.rows {
        if seen.insert(row.id) {
            batch.refresh.push((row.id, row.kind));
        }
    }
    batch
}

/// Pre-order flatten of one tree: parents precede their children.
pub fn flatten_into(mut item: MetadataItem, out: &mut Vec<CatalogItem>) {
    let id = *item.id.get_or_insert_with(ItemId::new);
    let children = std::mem::take(&mut item.children);
    out.push(to_catalog_item(item, id));
    for mut child in children {
        child.parent_id.get_or_insert(id);
        flatten_into(child, out);
    }
}

fn to_catalog_item(item: MetadataItem, id: ItemId) -> CatalogItem {
    CatalogItem {
        id,
        kind: item.kind,
        library_id: item.library_id,
        location_id: item.location_id,
        parent_id: item.parent_id,
        title: item.title,
        year: item.year,
        season_number: item.season_number,
        episode_number: item.episode_number,
        path: item.file.path,
        is_dir: item.file.is_dir,
        size: item.file.size,
        modified: item.file.modified,
        additional_files: item.additional_files,
        genres: item.genres,
        tags: item.tags,
        credits: item.credits,
        local_metadata_applied: item.local_metadata_applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::KnownPath;
    use shelf_model::{FileDescriptor, LibraryId, LocationId};
    use std::path::Path;
    use std::sync::Arc;

    fn node(kind: ItemKind, path: &str) -> MetadataItem {
        MetadataItem::new(
            kind,
            LibraryId::new(),
            LocationId::new(),
            FileDescriptor::file(path, 1, None),
            path,
        )
    }

    fn work(resolved: Option<MetadataItem>, known: bool) -> ScanWorkItem {
        let path = resolved
            .as_ref()
            .map(|r| r.file.path.clone())
            .unwrap_or_else(|| "/x".into());
        let mut item = ScanWorkItem::new(
            FileDescriptor::file(path.clone(), 1, None),
            LocationId::new(),
            Arc::from(Path::new("/")),
        );
        item.known = known.then(|| KnownPath {
            path,
            item_id: ItemId::new(),
            is_dir: false,
            size: 1,
            modified: None,
        });
        item.resolved = resolved;
        item
    }

    #[test]
    fn nested_children_are_flattened_and_linked() {
        let season = node(ItemKind::Season, "/tv/Show/S1")
            .with_child(node(ItemKind::Episode, "/tv/Show/S1/e1.mkv"))
            .with_child(node(ItemKind::Episode, "/tv/Show/S1/e2.mkv"));
        let series = node(ItemKind::Series, "/tv/Show").with_child(season);

        let mut rows = Vec::new();
        flatten_into(series, &mut rows);

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].kind, ItemKind::Series);
        assert_eq!(rows[0].parent_id, None);
        assert_eq!(rows[1].parent_id, Some(rows[0].id));
        assert_eq!(rows[2].parent_id, Some(rows[1].id));
        assert_eq!(rows[3].parent_id, Some(rows[1].id));
        let ids: HashSet<_> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn explicit_ids_and_parents_are_kept() {
        let existing = ItemId::new();
        let other_parent = ItemId::new();
        let mut parent = node(ItemKind::Series, "/tv/Show");
        parent.id = Some(existing);
        let child = node(ItemKind::Season, "/tv/Show/S1")
            .with_parent(Some(other_parent));

        let mut rows = Vec::new();
        flatten_into(parent.with_child(child), &mut rows);
        assert_eq!(rows[0].id, existing);
        assert_eq!(rows[1].parent_id, Some(other_parent));
    }

    #[test]
    fn batch_counts_added_and_updated_top_level_items() {
        let batch = flatten_batch(vec![
            work(Some(node(ItemKind::Movie, "/m/new.mkv")), false),
            work(Some(node(ItemKind::Movie, "/m/changed.mkv")), true),
            work(None, false),
        ]);
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.added, 1);
        assert_eq!(batch.updated, 1);
        assert_eq!(batch.refresh.len(), 2);
    }

    #[test]
    fn pending_batch_fills_and_drains() {
        let mut pending = PendingBatch::new(2);
        pending.push(work(None, false));
        assert!(!pending.is_full());
        pending.push(work(None, false));
        assert!(pending.is_full());
        assert_eq!(pending.take().len(), 2);
        assert!(pending.is_empty());
        pending.push(work(None, false));
        assert_eq!(pending.discard(), 1);
    }
}
