use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use shelf_model::{
    CatalogItem, ItemId, Library, LibraryId, LibraryLocation,
    LibraryScan, LocationId, ScanCounters, ScanId,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use crate::MIGRATOR;
use crate::config::DeletionMode;
use crate::error::{Result, ScanError};
use crate::ports::{
    CatalogRepository, KnownPath, KnownPathPage, LibraryRepository,
    ScanRepository,
};

/// Rows per multi-row insert; keeps bind counts well under the protocol cap.
const UPSERT_CHUNK: usize = 500;

/// PostgreSQL adapter implementing every repository port.
#[derive(Clone, Debug)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url` and apply pending migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        MIGRATOR.run(&pool).await?;
        info!(target: "catalog::postgres", "catalog migrations applied");
        Ok(Self::new(pool))
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn to_i32(value: Option<u32>) -> Option<i32> {
    value.and_then(|v| i32::try_from(v).ok())
}

#[derive(Debug, sqlx::FromRow)]
struct LibraryRow {
    id: Uuid,
    name: String,
    library_type: String,
    last_scanned_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LocationRow {
    id: Uuid,
    library_id: Uuid,
    path: String,
}

impl LibraryRow {
    fn into_library(self, locations: Vec<LibraryLocation>) -> Result<Library> {
        Ok(Library {
            id: LibraryId(self.id),
            name: self.name,
            library_type: self.library_type.parse()?,
            locations,
            last_scanned_at: self.last_scanned_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl From<LocationRow> for LibraryLocation {
    fn from(row: LocationRow) -> Self {
        LibraryLocation {
            id: LocationId(row.id),
            path: PathBuf::from(row.path),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct KnownPathRow {
    path: String,
    item_id: Uuid,
    is_dir: bool,
    size: i64,
    modified_at: Option<DateTime<Utc>>,
}

impl From<KnownPathRow> for KnownPath {
    fn from(row: KnownPathRow) -> Self {
        KnownPath {
            path: PathBuf::from(row.path),
            item_id: ItemId(row.item_id),
            is_dir: row.is_dir,
            size: u64::try_from(row.size).unwrap_or_default(),
            modified: row.modified_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScanRow {
    id: Uuid,
    library_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    total_items: i64,
    processed_items: i64,
    added_items: i64,
    updated_items: i64,
    removed_items: i64,
    error_message: Option<String>,
    current_stage: Option<String>,
    resume_cursor: Option<String>,
    checkpoint_version: Option<i32>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScanRow> for LibraryScan {
    type Error = ScanError;

    fn try_from(row: ScanRow) -> Result<Self> {
        let count = |v: i64| u64::try_from(v).unwrap_or_default();
        Ok(LibraryScan {
            id: ScanId(row.id),
            library_id: LibraryId(row.library_id),
            status: row.status.parse()?,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            counters: ScanCounters {
                total: count(row.total_items),
                processed: count(row.processed_items),
                added: count(row.added_items),
                updated: count(row.updated_items),
                removed: count(row.removed_items),
            },
            error_message: row.error_message,
            current_stage: row.current_stage,
            resume_cursor: row.resume_cursor,
            checkpoint_version: row.checkpoint_version,
            updated_at: row.updated_at,
        })
    }
}

const SCAN_COLUMNS: &str = r#"
    id, library_id, status, created_at, started_at, completed_at,
    total_items, processed_items, added_items, updated_items, removed_items,
    error_message, current_stage, resume_cursor, checkpoint_version, updated_at
"#;

/// One `catalog_files` row about to be written.
struct FileRow {
    library_id: Uuid,
    path: String,
    item_id: Uuid,
    is_primary: bool,
    is_dir: bool,
    size: i64,
    modified: Option<DateTime<Utc>>,
}

fn file_rows(items: &[CatalogItem]) -> Vec<FileRow> {
    // Keyed by (library, path) so a single statement never touches a row twice.
    let mut rows: HashMap<(Uuid, String), FileRow> = HashMap::new();
    for item in items {
        let primary = std::iter::once((
            true,
            item.path.as_path(),
            item.is_dir,
            item.size,
            item.modified,
        ));
        let extras = item
            .additional_files
            .iter()
            .map(|f| (false, f.path.as_path(), f.is_dir, f.size, f.modified));
        for (is_primary, path, is_dir, size, modified) in primary.chain(extras) {
            let path = path_text(path);
            rows.insert(
                (item.library_id.to_uuid(), path.clone()),
                FileRow {
                    library_id: item.library_id.to_uuid(),
                    path,
                    item_id: item.id.to_uuid(),
                    is_primary,
                    is_dir,
                    size: i64::try_from(size).unwrap_or(i64::MAX),
                    modified,
                },
            );
        }
    }
    rows.into_values().collect()
}

async fn upsert_item_rows(
    conn: &mut PgConnection,
    items: &[CatalogItem],
) -> Result<()> {
    let mut builder = QueryBuilder::<Postgres>::new(
        r#"INSERT INTO catalog_items (
            id, library_id, location_id, parent_id, kind, title, year,
            season_number, episode_number, genres, tags, credits,
            local_metadata_applied
        ) "#,
    );
    builder.push_values(items, |mut row, item| {
        row.push_bind(item.id.to_uuid())
            .push_bind(item.library_id.to_uuid())
            .push_bind(item.location_id.to_uuid())
            .push_bind(item.parent_id.map(|id| id.to_uuid()))
            .push_bind(item.kind.as_str())
            .push_bind(item.title.clone())
            .push_bind(item.year.map(i32::from))
            .push_bind(to_i32(item.season_number))
            .push_bind(to_i32(item.episode_number))
            .push_bind(item.genres.clone())
            .push_bind(item.tags.clone())
            .push_bind(Json(item.credits.clone()))
            .push_bind(item.local_metadata_applied);
    });
    builder.push(
        r#" ON CONFLICT (id) DO UPDATE SET
            library_id = EXCLUDED.library_id,
            location_id = EXCLUDED.location_id,
            parent_id = EXCLUDED.parent_id,
            kind = EXCLUDED.kind,
            title = EXCLUDED.title,
            year = EXCLUDED.year,
            season_number = EXCLUDED.season_number,
            episode_number = EXCLUDED.episode_number,
            genres = EXCLUDED.genres,
            tags = EXCLUDED.tags,
            credits = EXCLUDED.credits,
            local_metadata_applied = EXCLUDED.local_metadata_applied,
            deleted_at = NULL,
            updated_at = NOW()"#,
    );

    builder.build().execute(&mut *conn).await.map_err(|e| {
        ScanError::Internal(format!("Failed to upsert catalog items: {}", e))
    })?;
    Ok(())
}

async fn replace_item_files(
    conn: &mut PgConnection,
    items: &[CatalogItem],
) -> Result<()> {
    let item_ids: Vec<Uuid> = items.iter().map(|i| i.id.to_uuid()).collect();
    sqlx::query("DELETE FROM catalog_files WHERE item_id = ANY($1)")
        .bind(&item_ids)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            ScanError::Internal(format!("Failed to clear item files: {}", e))
        })?;

    let rows = file_rows(items);
    if rows.is_empty() {
        return Ok(());
    }

    let (libraries, paths): (Vec<Uuid>, Vec<String>) =
        rows.iter().map(|r| (r.library_id, r.path.clone())).unzip();
    let displaced: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT f.item_id
        FROM catalog_files f
        JOIN UNNEST($1::uuid[], $2::text[]) AS claimed(library_id, path)
          ON f.library_id = claimed.library_id AND f.path = claimed.path
        "#,
    )
    .bind(&libraries)
    .bind(&paths)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        ScanError::Internal(format!("Failed to look up path owners: {}", e))
    })?;

    let mut builder = QueryBuilder::<Postgres>::new(
        r#"INSERT INTO catalog_files (
            library_id, path, item_id, is_primary, is_dir, size, modified_at
        ) "#,
    );
    builder.push_values(&rows, |mut b, row| {
        b.push_bind(row.library_id)
            .push_bind(row.path.clone())
            .push_bind(row.item_id)
            .push_bind(row.is_primary)
            .push_bind(row.is_dir)
            .push_bind(row.size)
            .push_bind(row.modified);
    });
    builder.push(
        r#" ON CONFLICT (library_id, path) DO UPDATE SET
            item_id = EXCLUDED.item_id,
            is_primary = EXCLUDED.is_primary,
            is_dir = EXCLUDED.is_dir,
            size = EXCLUDED.size,
            modified_at = EXCLUDED.modified_at,
            deleted_at = NULL"#,
    );
    builder.build().execute(&mut *conn).await.map_err(|e| {
        ScanError::Internal(format!("Failed to write item files: {}", e))
    })?;

    if !displaced.is_empty() {
        let displaced: Vec<Uuid> = displaced.into_iter().map(|(id,)| id).collect();
        sqlx::query(
            r#"
            DELETE FROM catalog_items i
            WHERE i.id = ANY($1)
              AND NOT EXISTS (SELECT 1 FROM catalog_files f WHERE f.item_id = i.id)
            "#,
        )
        .bind(&displaced)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            ScanError::Internal(format!(
                "Failed to drop items without paths: {}",
                e
            ))
        })?;
    }
    Ok(())
}

#[async_trait]
impl LibraryRepository for PostgresCatalog {
    async fn save_library(&self, library: &Library) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            INSERT INTO libraries (id, name, library_type, last_scanned_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                library_type = EXCLUDED.library_type,
                last_scanned_at = EXCLUDED.last_scanned_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(library.id.to_uuid())
        .bind(&library.name)
        .bind(library.library_type.as_str())
        .bind(library.last_scanned_at)
        .bind(library.created_at)
        .bind(library.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| ScanError::Internal(format!("Failed to save library: {}", e)))?;

        sqlx::query("DELETE FROM library_locations WHERE library_id = $1")
            .bind(library.id.to_uuid())
            .execute(&mut *tx)
            .await?;

        for (position, location) in library.locations.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO library_locations (id, library_id, path, position)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(location.id.to_uuid())
            .bind(library.id.to_uuid())
            .bind(path_text(&location.path))
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                ScanError::Internal(format!("Failed to save library location: {}", e))
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_library(&self, id: LibraryId) -> Result<Option<Library>> {
        let row = sqlx::query_as::<_, LibraryRow>(
            r#"
            SELECT id, name, library_type, last_scanned_at, created_at, updated_at
            FROM libraries
            WHERE id = $1
            "#,
        )
        .bind(id.to_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| ScanError::Internal(format!("Failed to load library: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let locations = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT id, library_id, path
            FROM library_locations
            WHERE library_id = $1
            ORDER BY position
            "#,
        )
        .bind(id.to_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            ScanError::Internal(format!("Failed to load library locations: {}", e))
        })?;

        row.into_library(locations.into_iter().map(Into::into).collect())
            .map(Some)
    }

    async fn list_libraries(&self) -> Result<Vec<Library>> {
        let rows = sqlx::query_as::<_, LibraryRow>(
            r#"
            SELECT id, name, library_type, last_scanned_at, created_at, updated_at
            FROM libraries
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| ScanError::Internal(format!("Failed to list libraries: {}", e)))?;

        let location_rows = sqlx::query_as::<_, LocationRow>(
            "SELECT id, library_id, path FROM library_locations ORDER BY library_id, position",
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            ScanError::Internal(format!("Failed to list library locations: {}", e))
        })?;

        let mut locations: HashMap<Uuid, Vec<LibraryLocation>> = HashMap::new();
        for row in location_rows {
            locations.entry(row.library_id).or_default().push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let owned = locations.remove(&row.id).unwrap_or_default();
                row.into_library(owned)
            })
            .collect()
    }

    async fn mark_scanned(&self, id: LibraryId, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE libraries SET last_scanned_at = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(id.to_uuid())
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            ScanError::Internal(format!("Failed to mark library scanned: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(ScanError::NotFound(format!("library {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for PostgresCatalog {
    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool().begin().await?;
        for chunk in items.chunks(UPSERT_CHUNK) {
            upsert_item_rows(&mut tx, chunk).await?;
            replace_item_files(&mut tx, chunk).await?;
        }
        tx.commit().await?;

        Ok(items.len() as u64)
    }

    fn known_paths(
        &self,
        library_id: LibraryId,
        page_size: usize,
    ) -> BoxStream<'_, Result<KnownPathPage>> {
        let limit = i64::try_from(page_size.max(1)).unwrap_or(i64::MAX);
        Box::pin(async_stream::stream! {
            // Keyset paging on the byte-ordered path column.
            let mut after = String::new();
            loop {
                let page = sqlx::query_as::<_, KnownPathRow>(
                    r#"
                    SELECT f.path, f.item_id, f.is_dir, f.size, f.modified_at
                    FROM catalog_files f
                    JOIN catalog_items i ON i.id = f.item_id
                    WHERE f.library_id = $1
                      AND f.deleted_at IS NULL
                      AND i.deleted_at IS NULL
                      AND f.path > $2
                    ORDER BY f.path
                    LIMIT $3
                    "#,
                )
                .bind(library_id.to_uuid())
                .bind(&after)
                .bind(limit)
                .fetch_all(self.pool())
                .await;

                let rows = match page {
                    Ok(rows) => rows,
                    Err(e) => {
                        yield Err(ScanError::Internal(format!(
                            "Failed to page known paths: {}",
                            e
                        )));
                        break;
                    }
                };
                let Some(last) = rows.last() else {
                    break;
                };
                after = last.path.clone();
                let exhausted = (rows.len() as i64) < limit;
                yield Ok(rows.into_iter().map(KnownPath::from).collect::<KnownPathPage>());
                if exhausted {
                    break;
                }
            }
        })
    }

    async fn delete_paths(
        &self,
        library_id: LibraryId,
        paths: &[PathBuf],
        mode: DeletionMode,
    ) -> Result<u64> {
        if paths.is_empty() {
            return Ok(0);
        }
        let paths: Vec<String> = paths.iter().map(|p| path_text(p)).collect();
        let mut tx = self.pool().begin().await?;

        let remove_files = match mode {
            DeletionMode::Soft => {
                r#"
                UPDATE catalog_files SET deleted_at = NOW()
                WHERE library_id = $1 AND path = ANY($2) AND deleted_at IS NULL
                RETURNING item_id
                "#
            }
            DeletionMode::Hard => {
                r#"
                DELETE FROM catalog_files
                WHERE library_id = $1 AND path = ANY($2) AND deleted_at IS NULL
                RETURNING item_id
                "#
            }
        };
        let owners: Vec<(Uuid,)> = sqlx::query_as(remove_files)
            .bind(library_id.to_uuid())
            .bind(&paths)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| {
                ScanError::Internal(format!("Failed to delete catalog paths: {}", e))
            })?;
        let removed = owners.len() as u64;

        let mut owner_ids: Vec<Uuid> = owners.into_iter().map(|(id,)| id).collect();
        owner_ids.sort_unstable();
        owner_ids.dedup();

        let remove_items = match mode {
            DeletionMode::Soft => {
                r#"
                UPDATE catalog_items i SET deleted_at = NOW(), updated_at = NOW()
                WHERE i.id = ANY($1)
                  AND i.deleted_at IS NULL
                  AND NOT EXISTS (
                      SELECT 1 FROM catalog_files f
                      WHERE f.item_id = i.id AND f.deleted_at IS NULL
                  )
                "#
            }
            DeletionMode::Hard => {
                r#"
                DELETE FROM catalog_items i
                WHERE i.id = ANY($1)
                  AND NOT EXISTS (
                      SELECT 1 FROM catalog_files f
                      WHERE f.item_id = i.id AND f.deleted_at IS NULL
                  )
                "#
            }
        };
        sqlx::query(remove_items)
            .bind(&owner_ids)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                ScanError::Internal(format!("Failed to delete orphaned items: {}", e))
            })?;

        tx.commit().await?;
        Ok(removed)
    }
}

#[async_trait]
impl ScanRepository for PostgresCatalog {
    async fn create_scan(&self, scan: &LibraryScan) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO library_scans (
                id, library_id, status, created_at, started_at, completed_at,
                total_items, processed_items, added_items, updated_items, removed_items,
                error_message, current_stage, resume_cursor, checkpoint_version, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(scan.id.to_uuid())
        .bind(scan.library_id.to_uuid())
        .bind(scan.status.as_str())
        .bind(scan.created_at)
        .bind(scan.started_at)
        .bind(scan.completed_at)
        .bind(scan.counters.total as i64)
        .bind(scan.counters.processed as i64)
        .bind(scan.counters.added as i64)
        .bind(scan.counters.updated as i64)
        .bind(scan.counters.removed as i64)
        .bind(&scan.error_message)
        .bind(&scan.current_stage)
        .bind(&scan.resume_cursor)
        .bind(scan.checkpoint_version)
        .bind(scan.updated_at)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(ScanError::Conflict(format!(
                    "library {} already has an active scan",
                    scan.library_id
                )))
            }
            Err(e) => Err(ScanError::Internal(format!("Failed to create scan: {}", e))),
        }
    }

    async fn get_scan(&self, id: ScanId) -> Result<Option<LibraryScan>> {
        let sql = format!("SELECT {SCAN_COLUMNS} FROM library_scans WHERE id = $1");
        sqlx::query_as::<_, ScanRow>(&sql)
            .bind(id.to_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| ScanError::Internal(format!("Failed to load scan: {}", e)))?
            .map(LibraryScan::try_from)
            .transpose()
    }

    async fn update_scan(&self, scan: &LibraryScan) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE library_scans SET
                status = $2,
                started_at = $3,
                completed_at = $4,
                total_items = $5,
                processed_items = $6,
                added_items = $7,
                updated_items = $8,
                removed_items = $9,
                error_message = $10,
                current_stage = $11,
                resume_cursor = $12,
                checkpoint_version = $13,
                updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(scan.id.to_uuid())
        .bind(scan.status.as_str())
        .bind(scan.started_at)
        .bind(scan.completed_at)
        .bind(scan.counters.total as i64)
        .bind(scan.counters.processed as i64)
        .bind(scan.counters.added as i64)
        .bind(scan.counters.updated as i64)
        .bind(scan.counters.removed as i64)
        .bind(&scan.error_message)
        .bind(&scan.current_stage)
        .bind(&scan.resume_cursor)
        .bind(scan.checkpoint_version)
        .bind(scan.updated_at)
        .execute(self.pool())
        .await
        .map_err(|e| ScanError::Internal(format!("Failed to update scan: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(ScanError::NotFound(format!("scan {}", scan.id)));
        }
        Ok(())
    }

    async fn find_active_scan(
        &self,
        library_id: LibraryId,
    ) -> Result<Option<LibraryScan>> {
        let sql = format!(
            "SELECT {SCAN_COLUMNS} FROM library_scans \
             WHERE library_id = $1 AND status IN ('pending', 'running') \
             ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, ScanRow>(&sql)
            .bind(library_id.to_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| {
                ScanError::Internal(format!("Failed to find active scan: {}", e))
            })?
            .map(LibraryScan::try_from)
            .transpose()
    }

    fn scan_history(
        &self,
        library_id: LibraryId,
    ) -> BoxStream<'_, Result<LibraryScan>> {
        Box::pin(async_stream::stream! {
            let sql = format!(
                "SELECT {SCAN_COLUMNS} FROM library_scans \
                 WHERE library_id = $1 ORDER BY created_at DESC, id DESC"
            );
            let mut rows = sqlx::query_as::<_, ScanRow>(&sql)
                .bind(library_id.to_uuid())
                .fetch(self.pool());
            while let Some(row) = rows.next().await {
                yield row
                    .map_err(|e| {
                        ScanError::Internal(format!("Failed to read scan history: {}", e))
                    })
                    .and_then(LibraryScan::try_from);
            }
        })
    }

    async fn interrupted_scans(&self) -> Result<Vec<LibraryScan>> {
        let sql = format!(
            "SELECT {SCAN_COLUMNS} FROM library_scans \
             WHERE status = 'running' \
               AND current_stage IS NOT NULL \
               AND resume_cursor IS NOT NULL \
             ORDER BY created_at"
        );
        sqlx::query_as::<_, ScanRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(|e| {
                ScanError::Internal(format!("Failed to list interrupted scans: {}", e))
            })?
            .into_iter()
            .map(LibraryScan::try_from)
            .collect()
    }
}
