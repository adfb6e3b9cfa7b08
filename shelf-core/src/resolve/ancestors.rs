use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shelf_model::{FileDescriptor, MetadataItem};

/// A resolved directory remembered so later entries can see their parents.
#[derive(Debug, Clone)]
pub struct CachedAncestor {
    /// Resolved item without its nested children.
    pub item: MetadataItem,
    pub file: FileDescriptor,
}

/// Directory-only cache of resolved ancestors, keyed by path.
///
/// Every lookup marks the ancestors it touched as active. Every
/// `prune_interval` processed entries, entries not touched since the previous
/// prune are evicted and the active set starts over. With a depth-first walk
/// the ancestors of the entry being processed are always touched, so they are
/// never evicted while their subtree is still being visited.
#[derive(Debug)]
pub struct AncestorCache {
    entries: HashMap<PathBuf, Arc<CachedAncestor>>,
    active: HashSet<PathBuf>,
    prune_interval: usize,
    since_prune: usize,
    evicted: u64,
}

impl AncestorCache {
    pub fn new(prune_interval: usize) -> Self {
        Self {
            entries: HashMap::new(),
            active: HashSet::new(),
            prune_interval: prune_interval.max(1),
            since_prune: 0,
            evicted: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Total entries evicted by pruning so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Remember a resolved directory and mark it active.
    pub fn insert(&mut self, mut item: MetadataItem, file: FileDescriptor) {
        item.children.clear();
        let path = file.path.clone();
        self.active.insert(path.clone());
        self.entries
            .insert(path, Arc::new(CachedAncestor { item, file }));
    }

    /// Cached ancestors of `path`, root-first, excluding `path` itself.
    /// Every returned entry is marked active.
    pub fn chain_for(&mut self, path: &Path) -> Vec<Arc<CachedAncestor>> {
        let mut chain: Vec<Arc<CachedAncestor>> = path
            .ancestors()
            .skip(1)
            .filter_map(|ancestor| {
                self.entries.get(ancestor).map(|entry| {
                    self.active.insert(ancestor.to_path_buf());
                    Arc::clone(entry)
                })
            })
            .collect();
        chain.reverse();
        chain
    }

    /// Mark the cached ancestors of `path` active without building a chain.
    pub fn touch(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if self.entries.contains_key(ancestor) {
                self.active.insert(ancestor.to_path_buf());
            }
        }
    }

    /// Count one processed entry; prunes when the interval is reached.
    /// Returns the number of evicted entries when a prune ran.
    pub fn record_processed(&mut self) -> Option<usize> {
        self.since_prune += 1;
        if self.since_prune < self.prune_interval {
            return None;
        }
        self.since_prune = 0;
        Some(self.prune())
    }

    /// Evict every entry not touched since the previous prune.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        let active = std::mem::take(&mut self.active);
        self.entries.retain(|path, _| active.contains(path));
        let evicted = before - self.entries.len();
        self.evicted += evicted as u64;
        evicted
    }

    /// Release spare capacity on very large libraries.
    pub fn shrink(&mut self) {
        self.entries.shrink_to_fit();
        self.active.shrink_to_fit();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.active.clear();
        self.since_prune = 0;
        self.shrink();
    }
}
