//! Shared harness for the integration tests: a revision manager over the
//! in-memory metadata store and a tempdir blob store, plus fault-injecting
//! wrappers around both.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use revstore_core::config::{MaintenanceConfig, RevisionConfig, StorageConfig};
use revstore_core::error::AppError;
use revstore_core::result::AppResult;
use revstore_core::traits::blob::{BlobInfo, BlobStore, BlobWrite, ByteStream};
use revstore_core::types::{FileId, OwnerId};
use revstore_database::{MemoryMetadataStore, MetadataStore};
use revstore_entity::{FileDocument, FileRecord, FileRevision, NewFile, NewRevision, OwnerStats};
use revstore_service::{
    MaintenanceService, RequestContext, RevisionManager, UploadContent, UploadPolicy,
};
use revstore_storage::{BlobStoreManager, LocalBlobStore};

pub const MAX_UPLOAD: u64 = 1024 * 1024;

/// Blob store that can be told to fail writes or deletes.
#[derive(Debug)]
pub struct FlakyBlobStore {
    inner: LocalBlobStore,
    pub fail_puts: AtomicBool,
    pub fail_deletes: AtomicBool,
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    fn provider_type(&self) -> &str {
        "flaky"
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    async fn put(&self, key: &str, data: ByteStream, max_bytes: Option<u64>) -> AppResult<BlobWrite> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::storage("injected put failure"));
        }
        self.inner.put(key, data, max_bytes).await
    }

    async fn get(&self, key: &str) -> AppResult<ByteStream> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::storage("injected delete failure"));
        }
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.inner.exists(key).await
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<BlobInfo>> {
        self.inner.list(prefix).await
    }

    async fn purge_temp(&self, max_age: Duration) -> AppResult<u64> {
        self.inner.purge_temp(max_age).await
    }
}

/// Metadata store whose first `conflicts` revision inserts fail with
/// `Conflict`, as if another writer had claimed the number first.
#[derive(Debug)]
pub struct ContendedMetadataStore {
    inner: MemoryMetadataStore,
    pub conflicts: AtomicU32,
    pub insert_attempts: AtomicU32,
}

impl ContendedMetadataStore {
    pub fn new(conflicts: u32) -> Self {
        Self {
            inner: MemoryMetadataStore::new(),
            conflicts: AtomicU32::new(conflicts),
            insert_attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl MetadataStore for ContendedMetadataStore {
    fn backend_name(&self) -> &'static str {
        "contended"
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    async fn create_file(&self, file: NewFile, first: NewRevision) -> AppResult<FileDocument> {
        self.inner.create_file(file, first).await
    }

    async fn find_file(&self, file_id: FileId) -> AppResult<Option<FileRecord>> {
        self.inner.find_file(file_id).await
    }

    async fn find_file_any(&self, file_id: FileId) -> AppResult<Option<FileRecord>> {
        self.inner.find_file_any(file_id).await
    }

    async fn load_document(&self, file_id: FileId) -> AppResult<Option<FileDocument>> {
        self.inner.load_document(file_id).await
    }

    async fn insert_next_revision(
        &self,
        file_id: FileId,
        revision: NewRevision,
    ) -> AppResult<FileRevision> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            tokio::task::yield_now().await;
            return Err(AppError::conflict("revision number already taken"));
        }
        self.inner.insert_next_revision(file_id, revision).await
    }

    async fn find_revision(
        &self,
        file_id: FileId,
        revision_number: i32,
    ) -> AppResult<Option<FileRevision>> {
        self.inner.find_revision(file_id, revision_number).await
    }

    async fn latest_revision(&self, file_id: FileId) -> AppResult<Option<FileRevision>> {
        self.inner.latest_revision(file_id).await
    }

    async fn list_revisions(&self, file_id: FileId) -> AppResult<Vec<FileRevision>> {
        self.inner.list_revisions(file_id).await
    }

    async fn storage_keys(&self, file_id: FileId) -> AppResult<Vec<String>> {
        self.inner.storage_keys(file_id).await
    }

    async fn list_files(
        &self,
        owner_id: OwnerId,
        search: Option<&str>,
    ) -> AppResult<Vec<FileDocument>> {
        self.inner.list_files(owner_id, search).await
    }

    async fn rename_file(&self, file_id: FileId, display_name: &str) -> AppResult<FileRecord> {
        self.inner.rename_file(file_id, display_name).await
    }

    async fn mark_deleting(&self, file_id: FileId) -> AppResult<bool> {
        self.inner.mark_deleting(file_id).await
    }

    async fn purge_file(&self, file_id: FileId) -> AppResult<bool> {
        self.inner.purge_file(file_id).await
    }

    async fn find_deleting(&self) -> AppResult<Vec<FileRecord>> {
        self.inner.find_deleting().await
    }

    async fn is_storage_key_referenced(&self, storage_key: &str) -> AppResult<bool> {
        self.inner.is_storage_key_referenced(storage_key).await
    }

    async fn owner_stats(&self, owner_id: OwnerId) -> AppResult<OwnerStats> {
        self.inner.owner_stats(owner_id).await
    }
}

/// A revision manager wired to inspectable stores.
pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub metadata: Arc<dyn MetadataStore>,
    pub blobs: Arc<FlakyBlobStore>,
    pub manager: RevisionManager,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_metadata(Arc::new(MemoryMetadataStore::new())).await
    }

    pub async fn with_metadata(metadata: Arc<dyn MetadataStore>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(FlakyBlobStore {
            inner: LocalBlobStore::open(dir.path()).await.unwrap(),
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        });
        let storage = BlobStoreManager::with_store(blobs.clone(), MAX_UPLOAD);
        let manager = RevisionManager::new(
            metadata.clone(),
            &storage,
            RevisionConfig {
                max_attempts: 8,
                base_delay_ms: 1,
                max_delay_ms: 10,
            },
        );
        Self {
            dir,
            metadata,
            blobs,
            manager,
        }
    }

    /// Apply the allowlists and quota from `storage` to the manager.
    pub fn with_storage_policy(mut self, storage: StorageConfig) -> Self {
        self.manager = self
            .manager
            .with_upload_policy(UploadPolicy::from_config(&storage));
        self
    }

    pub fn maintenance(&self) -> MaintenanceService {
        MaintenanceService::new(
            self.metadata.clone(),
            self.blobs.clone(),
            MaintenanceConfig {
                orphan_grace_seconds: 0,
                temp_max_age_seconds: 0,
                interval_seconds: 60,
            },
        )
    }

    /// Every published blob key.
    pub async fn blob_keys(&self) -> Vec<String> {
        self.blobs
            .list("")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.key)
            .collect()
    }
}

pub fn owner() -> RequestContext {
    RequestContext::new(OwnerId::new())
}

pub fn upload(data: impl Into<Bytes>) -> UploadContent {
    UploadContent::from_bytes(data)
}

/// Split `data` into `chunk`-sized pieces delivered as separate stream items.
pub fn chunked(data: Vec<u8>, chunk: usize) -> UploadContent {
    let chunks: Vec<Result<Bytes, std::io::Error>> = data
        .chunks(chunk)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    UploadContent::new(Box::pin(futures::stream::iter(chunks)))
}
