#![cfg(feature = "database")]

use std::path::PathBuf;

use futures::TryStreamExt;
use shelf_core::ports::{CatalogRepository, LibraryRepository, ScanRepository};
use shelf_core::{DeletionMode, PostgresCatalog, ScanError};
use shelf_model::{
    CatalogItem, FileDescriptor, ItemId, ItemKind, Library, LibraryScan,
    LibraryType,
};
use sqlx::PgPool;

fn movie(library: &Library, path: &str) -> CatalogItem {
    CatalogItem {
        id: ItemId::new(),
        kind: ItemKind::Movie,
        library_id: library.id,
        location_id: library.locations[0].id,
        parent_id: None,
        title: "Heat".into(),
        year: Some(1995),
        season_number: None,
        episode_number: None,
        path: path.into(),
        is_dir: false,
        size: 42,
        modified: None,
        additional_files: Vec::new(),
        genres: vec!["Crime".into()],
        tags: Vec::new(),
        credits: Vec::new(),
        local_metadata_applied: false,
    }
}

async fn seeded(pool: PgPool) -> (PostgresCatalog, Library) {
    let catalog = PostgresCatalog::new(pool);
    let library =
        Library::new("Movies", LibraryType::Movies, [PathBuf::from("/m")]);
    catalog.save_library(&library).await.expect("save library");
    (catalog, library)
}

#[sqlx::test(migrator = "shelf_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn library_round_trips_with_locations(pool: PgPool) {
    let (catalog, library) = seeded(pool).await;
    let loaded = catalog
        .get_library(library.id)
        .await
        .expect("load")
        .expect("library exists");
    assert_eq!(loaded.name, "Movies");
    assert_eq!(loaded.locations, library.locations);
    assert_eq!(catalog.list_libraries().await.expect("list").len(), 1);
}

#[sqlx::test(migrator = "shelf_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn multi_part_paths_are_known_and_deleted_together(pool: PgPool) {
    let (catalog, library) = seeded(pool).await;
    let mut item = movie(&library, "/m/Heat cd1.mkv");
    item.additional_files =
        vec![FileDescriptor::file("/m/Heat cd2.mkv", 7, None)];
    catalog.upsert_items(&[item.clone()]).await.expect("upsert");

    let pages: Vec<_> = catalog
        .known_paths(library.id, 1)
        .try_collect()
        .await
        .expect("known paths");
    assert_eq!(pages.len(), 2);
    assert!(pages.iter().flatten().all(|k| k.item_id == item.id));

    let removed = catalog
        .delete_paths(
            library.id,
            &["/m/Heat cd1.mkv".into(), "/m/Heat cd2.mkv".into()],
            DeletionMode::Soft,
        )
        .await
        .expect("delete");
    assert_eq!(removed, 2);
    let pages: Vec<_> = catalog
        .known_paths(library.id, 10)
        .try_collect()
        .await
        .expect("known paths");
    assert!(pages.is_empty());
}

#[sqlx::test(migrator = "shelf_core::MIGRATOR")]
#[ignore = "requires DATABASE_URL"]
async fn second_active_scan_conflicts(pool: PgPool) {
    let (catalog, library) = seeded(pool).await;
    let mut first = LibraryScan::pending(library.id);
    catalog.create_scan(&first).await.expect("first");

    let err = catalog
        .create_scan(&LibraryScan::pending(library.id))
        .await
        .expect_err("conflict");
    assert!(matches!(err, ScanError::Conflict(_)));

    first.mark_running();
    first.current_stage = Some("traversal".into());
    first.resume_cursor = Some("{}".into());
    catalog.update_scan(&first).await.expect("update");
    let interrupted = catalog.interrupted_scans().await.expect("interrupted");
    assert_eq!(interrupted.len(), 1);

    let history: Vec<_> = catalog
        .scan_history(library.id)
        .try_collect()
        .await
        .expect("history");
    assert_eq!(history.len(), 1);
}
