//! PostgreSQL-backed [`MetadataStore`].
//!
//! Revision allocation runs in one transaction: the document row is locked by
//! bumping `updated_at`, the next number is read as `MAX + 1`, and the insert
//! is guarded by the `(file_id, revision_number)` unique constraint. Writers
//! on the same file serialize on the row lock; the constraint turns anything
//! that slips past it into a `Conflict`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use revstore_core::error::{AppError, ErrorKind};
use revstore_core::result::AppResult;
use revstore_core::types::{FileId, OwnerId};
use revstore_entity::{FileDocument, FileRecord, FileRevision, NewFile, NewRevision, OwnerStats};

use crate::store::MetadataStore;

const REVISION_NUMBER_KEY: &str = "file_revisions_file_id_revision_number_key";
const STORAGE_KEY_KEY: &str = "file_revisions_storage_key_key";
const FILE_PKEY: &str = "file_documents_pkey";

/// SQLSTATE codes for serialization failure and deadlock.
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];

/// Metadata store on top of a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Create a new store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_snapshot(&self) -> AppResult<sqlx::Transaction<'_, sqlx::Postgres>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to set isolation level", e)
            })?;
        Ok(tx)
    }
}

/// Map a write error, turning constraint races into `Conflict`.
fn map_write_error(e: sqlx::Error, context: &str) -> AppError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.constraint() {
            Some(REVISION_NUMBER_KEY) => {
                return AppError::conflict(format!("{context}: revision number already taken"));
            }
            Some(STORAGE_KEY_KEY) => {
                return AppError::conflict(format!("{context}: storage key already in use"));
            }
            Some(FILE_PKEY) => {
                return AppError::conflict(format!("{context}: file id already exists"));
            }
            _ => {}
        }
        if db_err
            .code()
            .is_some_and(|code| RETRYABLE_SQLSTATES.contains(&&*code))
        {
            return AppError::conflict(format!("{context}: concurrent update"));
        }
    }
    AppError::with_source(ErrorKind::Database, context.to_string(), e)
}

fn read_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, context, e)
}

/// Escape `%`, `_` and `\` for use inside an `ILIKE` pattern.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

async fn insert_revision(
    conn: &mut PgConnection,
    file_id: FileId,
    revision_number: i32,
    revision: &NewRevision,
    uploaded_at: DateTime<Utc>,
) -> Result<FileRevision, sqlx::Error> {
    sqlx::query_as::<_, FileRevision>(
        "INSERT INTO file_revisions (id, file_id, revision_number, uploaded_at, byte_size, \
         content_type, file_extension, storage_key, checksum_sha256) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
    )
    .bind(revision.id)
    .bind(file_id)
    .bind(revision_number)
    .bind(uploaded_at)
    .bind(revision.byte_size)
    .bind(&revision.content_type)
    .bind(&revision.file_extension)
    .bind(&revision.storage_key)
    .bind(&revision.checksum_sha256)
    .fetch_one(conn)
    .await
}

async fn fetch_live_record(conn: &mut PgConnection, file_id: FileId) -> AppResult<Option<FileRecord>> {
    sqlx::query_as::<_, FileRecord>(
        "SELECT * FROM file_documents WHERE id = $1 AND deleting_at IS NULL",
    )
    .bind(file_id)
    .fetch_optional(conn)
    .await
    .map_err(read_error("Failed to find file"))
}

async fn fetch_latest(conn: &mut PgConnection, file_id: FileId) -> AppResult<Option<FileRevision>> {
    sqlx::query_as::<_, FileRevision>(
        "SELECT r.* FROM file_revisions r JOIN file_documents d ON d.id = r.file_id \
         WHERE r.file_id = $1 AND d.deleting_at IS NULL \
         ORDER BY r.revision_number DESC LIMIT 1",
    )
    .bind(file_id)
    .fetch_optional(conn)
    .await
    .map_err(read_error("Failed to find latest revision"))
}

async fn fetch_count(conn: &mut PgConnection, file_id: FileId) -> AppResult<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM file_revisions WHERE file_id = $1")
        .bind(file_id)
        .fetch_one(conn)
        .await
        .map_err(read_error("Failed to count revisions"))
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> AppResult<bool> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(read_error("Database health check failed"))
    }

    async fn create_file(&self, file: NewFile, first: NewRevision) -> AppResult<FileDocument> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        let record = sqlx::query_as::<_, FileRecord>(
            "INSERT INTO file_documents (id, owner_id, display_name) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(file.id)
        .bind(file.owner_id)
        .bind(&file.display_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, "Failed to create file"))?;

        let revision = insert_revision(&mut *tx, record.id, 1, &first, record.created_at)
            .await
            .map_err(|e| map_write_error(e, "Failed to insert first revision"))?;

        tx.commit()
            .await
            .map_err(|e| map_write_error(e, "Failed to commit new file"))?;

        Ok(FileDocument::from_parts(record, revision, 1))
    }

    async fn find_file(&self, file_id: FileId) -> AppResult<Option<FileRecord>> {
        let mut conn = self.pool.acquire().await.map_err(read_error("Failed to acquire connection"))?;
        fetch_live_record(&mut conn, file_id).await
    }

    async fn find_file_any(&self, file_id: FileId) -> AppResult<Option<FileRecord>> {
        sqlx::query_as::<_, FileRecord>("SELECT * FROM file_documents WHERE id = $1")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error("Failed to find file"))
    }

    async fn load_document(&self, file_id: FileId) -> AppResult<Option<FileDocument>> {
        let mut tx = self.begin_snapshot().await?;

        let Some(record) = fetch_live_record(&mut *tx, file_id).await? else {
            return Ok(None);
        };
        let Some(latest) = fetch_latest(&mut *tx, file_id).await? else {
            return Ok(None);
        };
        let count = fetch_count(&mut *tx, file_id).await?;

        tx.commit().await.map_err(read_error("Failed to end snapshot"))?;
        Ok(Some(FileDocument::from_parts(record, latest, count)))
    }

    async fn insert_next_revision(
        &self,
        file_id: FileId,
        revision: NewRevision,
    ) -> AppResult<FileRevision> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        let touched: Option<DateTime<Utc>> = sqlx::query_scalar(
            "UPDATE file_documents SET updated_at = NOW() \
             WHERE id = $1 AND deleting_at IS NULL RETURNING updated_at",
        )
        .bind(file_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, "Failed to lock file"))?;

        let Some(uploaded_at) = touched else {
            return Err(AppError::not_found(format!("File {file_id} not found")));
        };

        let next: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(revision_number), 0) + 1 FROM file_revisions WHERE file_id = $1",
        )
        .bind(file_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, "Failed to allocate revision number"))?;

        let inserted = insert_revision(&mut *tx, file_id, next, &revision, uploaded_at)
            .await
            .map_err(|e| map_write_error(e, "Failed to insert revision"))?;

        tx.commit()
            .await
            .map_err(|e| map_write_error(e, "Failed to commit revision"))?;

        debug!(file_id = %file_id, revision_number = next, "Revision row committed");
        Ok(inserted)
    }

    async fn find_revision(
        &self,
        file_id: FileId,
        revision_number: i32,
    ) -> AppResult<Option<FileRevision>> {
        sqlx::query_as::<_, FileRevision>(
            "SELECT r.* FROM file_revisions r JOIN file_documents d ON d.id = r.file_id \
             WHERE r.file_id = $1 AND r.revision_number = $2 AND d.deleting_at IS NULL",
        )
        .bind(file_id)
        .bind(revision_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error("Failed to find revision"))
    }

    async fn latest_revision(&self, file_id: FileId) -> AppResult<Option<FileRevision>> {
        let mut conn = self.pool.acquire().await.map_err(read_error("Failed to acquire connection"))?;
        fetch_latest(&mut conn, file_id).await
    }

    async fn list_revisions(&self, file_id: FileId) -> AppResult<Vec<FileRevision>> {
        sqlx::query_as::<_, FileRevision>(
            "SELECT r.* FROM file_revisions r JOIN file_documents d ON d.id = r.file_id \
             WHERE r.file_id = $1 AND d.deleting_at IS NULL \
             ORDER BY r.revision_number ASC",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error("Failed to list revisions"))
    }

    async fn storage_keys(&self, file_id: FileId) -> AppResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT storage_key FROM file_revisions WHERE file_id = $1 ORDER BY revision_number",
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error("Failed to list storage keys"))
    }

    async fn list_files(
        &self,
        owner_id: OwnerId,
        search: Option<&str>,
    ) -> AppResult<Vec<FileDocument>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));

        let mut tx = self.begin_snapshot().await?;

        let records = sqlx::query_as::<_, FileRecord>(
            "SELECT * FROM file_documents \
             WHERE owner_id = $1 AND deleting_at IS NULL \
             AND ($2::TEXT IS NULL OR display_name ILIKE $2) \
             ORDER BY updated_at DESC, id DESC",
        )
        .bind(owner_id)
        .bind(&pattern)
        .fetch_all(&mut *tx)
        .await
        .map_err(read_error("Failed to list files"))?;

        if records.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = records.iter().map(|r| r.id.into_uuid()).collect();

        let latest = sqlx::query_as::<_, FileRevision>(
            "SELECT DISTINCT ON (file_id) * FROM file_revisions \
             WHERE file_id = ANY($1) ORDER BY file_id, revision_number DESC",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(read_error("Failed to load latest revisions"))?;

        let counts = sqlx::query_as::<_, (Uuid, i64)>(
            "SELECT file_id, COUNT(*) FROM file_revisions WHERE file_id = ANY($1) GROUP BY file_id",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(read_error("Failed to count revisions"))?;

        tx.commit().await.map_err(read_error("Failed to end snapshot"))?;

        let mut latest: HashMap<FileId, FileRevision> =
            latest.into_iter().map(|r| (r.file_id, r)).collect();
        let counts: HashMap<Uuid, i64> = counts.into_iter().collect();

        Ok(records
            .into_iter()
            .filter_map(|record| {
                let revision = latest.remove(&record.id)?;
                let count = counts.get(&record.id.into_uuid()).copied().unwrap_or(0);
                Some(FileDocument::from_parts(record, revision, count))
            })
            .collect())
    }

    async fn rename_file(&self, file_id: FileId, display_name: &str) -> AppResult<FileRecord> {
        sqlx::query_as::<_, FileRecord>(
            "UPDATE file_documents SET display_name = $2, updated_at = NOW() \
             WHERE id = $1 AND deleting_at IS NULL RETURNING *",
        )
        .bind(file_id)
        .bind(display_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Failed to rename file"))?
        .ok_or_else(|| AppError::not_found(format!("File {file_id} not found")))
    }

    async fn mark_deleting(&self, file_id: FileId) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE file_documents SET deleting_at = COALESCE(deleting_at, NOW()) WHERE id = $1",
        )
        .bind(file_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "Failed to mark file for deletion"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_file(&self, file_id: FileId) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM file_documents WHERE id = $1 AND deleting_at IS NOT NULL")
                .bind(file_id)
                .execute(&self.pool)
                .await
                .map_err(|e| map_write_error(e, "Failed to purge file"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_deleting(&self) -> AppResult<Vec<FileRecord>> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT * FROM file_documents WHERE deleting_at IS NOT NULL ORDER BY deleting_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(read_error("Failed to list pending deletions"))
    }

    async fn is_storage_key_referenced(&self, storage_key: &str) -> AppResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM file_revisions WHERE storage_key = $1)")
            .bind(storage_key)
            .fetch_one(&self.pool)
            .await
            .map_err(read_error("Failed to look up storage key"))
    }

    async fn owner_stats(&self, owner_id: OwnerId) -> AppResult<OwnerStats> {
        let mut tx = self.begin_snapshot().await?;

        let documents: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM file_documents WHERE owner_id = $1 AND deleting_at IS NULL",
        )
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(read_error("Failed to count files"))?;

        let groups = sqlx::query_as::<_, (String, i64, i64)>(
            "SELECT r.file_extension, COUNT(*), COALESCE(SUM(r.byte_size), 0)::BIGINT \
             FROM file_revisions r JOIN file_documents d ON d.id = r.file_id \
             WHERE d.owner_id = $1 AND d.deleting_at IS NULL \
             GROUP BY r.file_extension",
        )
        .bind(owner_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(read_error("Failed to aggregate revisions"))?;

        tx.commit().await.map_err(read_error("Failed to end snapshot"))?;

        let mut stats = OwnerStats {
            total_documents: documents.max(0) as u64,
            ..OwnerStats::default()
        };
        for (extension, revisions, bytes) in groups {
            stats.record_group(&extension, revisions, bytes);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revstore_core::types::RevisionId;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("report"), "report");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    /// Store over the database named by `DATABASE_URL`, migrated. The tests
    /// below are skipped when it is unset.
    async fn test_store() -> Option<PgMetadataStore> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping PostgreSQL test");
            return None;
        };
        let pool = PgPool::connect(&url)
            .await
            .expect("Failed to connect to test database");
        crate::migration::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        Some(PgMetadataStore::new(pool))
    }

    fn new_revision(key: &str) -> NewRevision {
        NewRevision {
            id: RevisionId::new(),
            byte_size: 10,
            content_type: "text/plain".to_string(),
            file_extension: ".txt".to_string(),
            storage_key: key.to_string(),
            checksum_sha256: None,
        }
    }

    async fn seed(store: &PgMetadataStore) -> FileDocument {
        let id = FileId::new();
        store
            .create_file(
                NewFile {
                    id,
                    owner_id: OwnerId::new(),
                    display_name: "notes.txt".to_string(),
                },
                new_revision(&format!("test/{id}/1")),
            )
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_get_consecutive_numbers() {
        let Some(store) = test_store().await else { return };
        let doc = seed(&store).await;
        const WRITERS: usize = 20;

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let store = store.clone();
                let key = format!("test/{}/w{i}", doc.id);
                tokio::spawn(async move {
                    for _ in 0..50 {
                        match store.insert_next_revision(doc.id, new_revision(&key)).await {
                            Err(e) if e.is_retryable() => tokio::task::yield_now().await,
                            result => return result,
                        }
                    }
                    Err(AppError::conflict("writer never got a revision number"))
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().revision_number);
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (2..=WRITERS as i32 + 1).collect::<Vec<_>>());

        let loaded = store.load_document(doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.revision_count, WRITERS as i64 + 1);
        assert_eq!(loaded.latest_revision.revision_number, WRITERS as i32 + 1);
    }

    #[tokio::test]
    async fn test_duplicate_revision_number_is_a_conflict() {
        let Some(store) = test_store().await else { return };
        let doc = seed(&store).await;
        let mut conn = store.pool.acquire().await.unwrap();

        let err = insert_revision(
            &mut conn,
            doc.id,
            1,
            &new_revision(&format!("test/{}/dup", doc.id)),
            Utc::now(),
        )
        .await
        .map_err(|e| map_write_error(e, "Failed to insert revision"))
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(err.message.contains("revision number"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_reused_storage_key_is_a_conflict() {
        let Some(store) = test_store().await else { return };
        let doc = seed(&store).await;

        let err = store
            .insert_next_revision(doc.id, new_revision(&doc.latest_revision.storage_key))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(store.list_revisions(doc.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tombstone_blocks_inserts_and_hides_the_file() {
        let Some(store) = test_store().await else { return };
        let doc = seed(&store).await;

        assert!(store.mark_deleting(doc.id).await.unwrap());

        let err = store
            .insert_next_revision(doc.id, new_revision(&format!("test/{}/late", doc.id)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        assert!(store.find_file(doc.id).await.unwrap().is_none());
        assert!(store.load_document(doc.id).await.unwrap().is_none());
        assert!(store.list_revisions(doc.id).await.unwrap().is_empty());
        assert_eq!(
            store.storage_keys(doc.id).await.unwrap(),
            vec![doc.latest_revision.storage_key.clone()]
        );
        assert!(store.find_deleting().await.unwrap().iter().any(|f| f.id == doc.id));

        assert!(store.purge_file(doc.id).await.unwrap());
        assert!(store.storage_keys(doc.id).await.unwrap().is_empty());
    }
}
