use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use shelf_model::{FileDescriptor, LibraryLocation};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fs::FileSystem;
use crate::pipeline::{ItemStream, ScanContext, ScanWorkItem, Stage};

/// Depth-first, pre-order walk over every library location.
///
/// Children are visited in file-name order so the emitted sequence is
/// ascending in `Path` order within a location. Directories are emitted before
/// their contents and carry their listing; files carry their parent listing.
pub struct DirectoryTraversalStage {
    fs: Arc<dyn FileSystem>,
}

impl std::fmt::Debug for DirectoryTraversalStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryTraversalStage").finish_non_exhaustive()
    }
}

impl DirectoryTraversalStage {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

struct Frame {
    entries: Arc<[FileDescriptor]>,
    next: usize,
}

impl Stage<LibraryLocation, ScanWorkItem> for DirectoryTraversalStage {
    fn name(&self) -> &'static str {
        "traversal"
    }

    fn apply(
        &self,
        input: ItemStream<LibraryLocation>,
        ctx: Arc<ScanContext>,
        cancel: CancellationToken,
    ) -> ItemStream<ScanWorkItem> {
        let fs = Arc::clone(&self.fs);
        Box::pin(async_stream::stream! {
            let mut input = input;
            let location_ids = ctx.location_ids();
            let include_hidden = ctx.config.include_hidden;

            while let Some(location) = input.next().await {
                if cancel.is_cancelled() {
                    return;
                }
                let location_index = location_ids
                    .iter()
                    .position(|id| *id == location.id)
                    .unwrap_or(usize::MAX);
                let root: Arc<Path> = Arc::from(location.path.as_path());

                let root_meta = match fs.metadata(&root).await {
                    Ok(meta) if meta.is_dir => meta,
                    Ok(_) => {
                        warn!(
                            target: "scan::traverse",
                            location = %root.display(),
                            "location is not a directory; skipping"
                        );
                        ctx.mark_unreachable(root.to_path_buf());
                        continue;
                    }
                    Err(err) => {
                        warn!(
                            target: "scan::traverse",
                            location = %root.display(),
                            error = %err,
                            "location unavailable; skipping"
                        );
                        ctx.mark_unreachable(root.to_path_buf());
                        continue;
                    }
                };

                let listing = match list_directory(fs.as_ref(), &root, include_hidden).await {
                    Ok(listing) => listing,
                    Err(err) => {
                        warn!(
                            target: "scan::traverse",
                            location = %root.display(),
                            error = %err,
                            "failed to enumerate location root; skipping"
                        );
                        ctx.mark_unreachable(root.to_path_buf());
                        continue;
                    }
                };

                info!(
                    target: "scan::traverse",
                    location = %root.display(),
                    entries = listing.len(),
                    "walking location"
                );

                let mut root_item = ScanWorkItem::new(
                    FileDescriptor::directory(root.to_path_buf(), root_meta.modified),
                    location.id,
                    Arc::clone(&root),
                );
                root_item.is_root = true;
                root_item.children = Some(Arc::clone(&listing));
                yield root_item;

                let mut stack = vec![Frame { entries: listing, next: 0 }];
                while let Some(frame) = stack.last_mut() {
                    if cancel.is_cancelled() {
                        return;
                    }
                    if frame.next >= frame.entries.len() {
                        stack.pop();
                        continue;
                    }
                    let entry = frame.entries[frame.next].clone();
                    let siblings = Arc::clone(&frame.entries);
                    frame.next += 1;

                    let mut item = ScanWorkItem::new(entry, location.id, Arc::clone(&root));
                    item.siblings = Some(siblings);
                    if let Some(checkpoint) = ctx.checkpoint.as_ref()
                        && !item.file.is_dir
                    {
                        item.replayed = checkpoint.covers(
                            &location_ids,
                            location_index,
                            &item.file.path,
                        );
                    }

                    if !item.file.is_dir {
                        yield item;
                        continue;
                    }

                    match list_directory(fs.as_ref(), &item.file.path, include_hidden).await {
                        Ok(children) => {
                            item.children = Some(Arc::clone(&children));
                            yield item;
                            stack.push(Frame { entries: children, next: 0 });
                        }
                        Err(err) => {
                            warn!(
                                target: "scan::traverse",
                                path = %item.file.path.display(),
                                error = %err,
                                "failed to enumerate directory; skipping its contents"
                            );
                            ctx.mark_unreachable(item.file.path.clone());
                            yield item;
                        }
                    }
                }
            }
        })
    }
}

/// List one directory, sorted by file name. Entries that vanish between the
/// listing and the stat are skipped; symlinks are skipped unless followed.
async fn list_directory(
    fs: &dyn FileSystem,
    path: &Path,
    include_hidden: bool,
) -> std::io::Result<Arc<[FileDescriptor]>> {
    let mut dir = fs.read_dir(path).await?;
    let mut entries = Vec::new();

    loop {
        let entry_path = match dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                warn!(
                    target: "scan::traverse",
                    path = %path.display(),
                    error = %err,
                    "skipping unreadable directory entry"
                );
                continue;
            }
        };

        let hidden = entry_path
            .file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false);
        if hidden && !include_hidden {
            continue;
        }

        let meta = match fs.metadata(&entry_path).await {
            Ok(meta) => meta,
            Err(err) => {
                debug!(
                    target: "scan::traverse",
                    path = %entry_path.display(),
                    error = %err,
                    "entry vanished before stat; skipping"
                );
                continue;
            }
        };

        if meta.is_dir {
            entries.push(FileDescriptor::directory(entry_path, meta.modified));
        } else if meta.is_file {
            entries.push(FileDescriptor::file(
                entry_path,
                meta.len,
                meta.modified,
            ));
        }
    }

    entries.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(entries.into())
}
