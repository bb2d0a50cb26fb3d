//! In-process [`MetadataStore`] used for tests and single-process tooling.
//!
//! All state sits behind one `RwLock`, so every write, revision allocation
//! included, is atomic with respect to every other operation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use revstore_core::error::AppError;
use revstore_core::result::AppResult;
use revstore_core::types::{FileId, OwnerId};
use revstore_entity::{FileDocument, FileRecord, FileRevision, NewFile, NewRevision, OwnerStats};

use crate::store::MetadataStore;

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<FileId, FileRecord>,
    revisions: HashMap<FileId, BTreeMap<i32, FileRevision>>,
    storage_keys: HashSet<String>,
}

impl MemoryState {
    fn live(&self, file_id: FileId) -> Option<&FileRecord> {
        self.files.get(&file_id).filter(|f| !f.is_deleting())
    }

    fn live_revisions(&self, file_id: FileId) -> Option<&BTreeMap<i32, FileRevision>> {
        self.live(file_id)?;
        self.revisions.get(&file_id)
    }

    fn document(&self, record: &FileRecord) -> Option<FileDocument> {
        let revisions = self.revisions.get(&record.id)?;
        let (_, latest) = revisions.last_key_value()?;
        Some(FileDocument::from_parts(
            record.clone(),
            latest.clone(),
            revisions.len() as i64,
        ))
    }
}

/// Metadata store kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn create_file(&self, file: NewFile, first: NewRevision) -> AppResult<FileDocument> {
        let mut state = self.state.write().await;

        if state.files.contains_key(&file.id) {
            return Err(AppError::conflict(format!("File {} already exists", file.id)));
        }
        if state.storage_keys.contains(&first.storage_key) {
            return Err(AppError::conflict(format!(
                "Storage key '{}' already in use",
                first.storage_key
            )));
        }

        let now = Utc::now();
        let record = FileRecord {
            id: file.id,
            owner_id: file.owner_id,
            display_name: file.display_name,
            created_at: now,
            updated_at: now,
            deleting_at: None,
        };
        let revision = first.into_revision(file.id, 1, now);

        state.storage_keys.insert(revision.storage_key.clone());
        state
            .revisions
            .insert(file.id, BTreeMap::from([(1, revision.clone())]));
        state.files.insert(file.id, record.clone());

        Ok(FileDocument::from_parts(record, revision, 1))
    }

    async fn find_file(&self, file_id: FileId) -> AppResult<Option<FileRecord>> {
        Ok(self.state.read().await.live(file_id).cloned())
    }

    async fn find_file_any(&self, file_id: FileId) -> AppResult<Option<FileRecord>> {
        Ok(self.state.read().await.files.get(&file_id).cloned())
    }

    async fn load_document(&self, file_id: FileId) -> AppResult<Option<FileDocument>> {
        let state = self.state.read().await;
        Ok(state.live(file_id).and_then(|record| state.document(record)))
    }

    async fn insert_next_revision(
        &self,
        file_id: FileId,
        revision: NewRevision,
    ) -> AppResult<FileRevision> {
        let mut state = self.state.write().await;

        if state.live(file_id).is_none() {
            return Err(AppError::not_found(format!("File {file_id} not found")));
        }
        if state.storage_keys.contains(&revision.storage_key) {
            return Err(AppError::conflict(format!(
                "Storage key '{}' already in use",
                revision.storage_key
            )));
        }

        let now = Utc::now();
        let revisions = state.revisions.entry(file_id).or_default();
        let next = revisions.last_key_value().map(|(n, _)| n + 1).unwrap_or(1);
        let inserted = revision.into_revision(file_id, next, now);
        revisions.insert(next, inserted.clone());

        state.storage_keys.insert(inserted.storage_key.clone());
        if let Some(record) = state.files.get_mut(&file_id) {
            record.updated_at = now;
        }

        Ok(inserted)
    }

    async fn find_revision(
        &self,
        file_id: FileId,
        revision_number: i32,
    ) -> AppResult<Option<FileRevision>> {
        let state = self.state.read().await;
        Ok(state
            .live_revisions(file_id)
            .and_then(|revs| revs.get(&revision_number))
            .cloned())
    }

    async fn latest_revision(&self, file_id: FileId) -> AppResult<Option<FileRevision>> {
        let state = self.state.read().await;
        Ok(state
            .live_revisions(file_id)
            .and_then(|revs| revs.last_key_value())
            .map(|(_, rev)| rev.clone()))
    }

    async fn list_revisions(&self, file_id: FileId) -> AppResult<Vec<FileRevision>> {
        let state = self.state.read().await;
        Ok(state
            .live_revisions(file_id)
            .map(|revs| revs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn storage_keys(&self, file_id: FileId) -> AppResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .revisions
            .get(&file_id)
            .map(|revs| revs.values().map(|r| r.storage_key.clone()).collect())
            .unwrap_or_default())
    }

    async fn list_files(
        &self,
        owner_id: OwnerId,
        search: Option<&str>,
    ) -> AppResult<Vec<FileDocument>> {
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let state = self.state.read().await;
        let mut documents: Vec<FileDocument> = state
            .files
            .values()
            .filter(|f| f.is_owned_by(owner_id) && !f.is_deleting())
            .filter(|f| match &needle {
                Some(needle) => f.display_name.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .filter_map(|f| state.document(f))
            .collect();

        documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(documents)
    }

    async fn rename_file(&self, file_id: FileId, display_name: &str) -> AppResult<FileRecord> {
        let mut state = self.state.write().await;
        match state.files.get_mut(&file_id) {
            Some(record) if !record.is_deleting() => {
                record.display_name = display_name.to_string();
                record.updated_at = Utc::now();
                Ok(record.clone())
            }
            _ => Err(AppError::not_found(format!("File {file_id} not found"))),
        }
    }

    async fn mark_deleting(&self, file_id: FileId) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.files.get_mut(&file_id) {
            Some(record) => {
                record.deleting_at.get_or_insert_with(Utc::now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_file(&self, file_id: FileId) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if !state.files.get(&file_id).is_some_and(|f| f.is_deleting()) {
            return Ok(false);
        }

        state.files.remove(&file_id);
        if let Some(revisions) = state.revisions.remove(&file_id) {
            for revision in revisions.values() {
                state.storage_keys.remove(&revision.storage_key);
            }
        }
        Ok(true)
    }

    async fn find_deleting(&self) -> AppResult<Vec<FileRecord>> {
        let state = self.state.read().await;
        let mut pending: Vec<FileRecord> = state
            .files
            .values()
            .filter(|f| f.is_deleting())
            .cloned()
            .collect();
        pending.sort_by_key(|f| f.deleting_at);
        Ok(pending)
    }

    async fn is_storage_key_referenced(&self, storage_key: &str) -> AppResult<bool> {
        Ok(self.state.read().await.storage_keys.contains(storage_key))
    }

    async fn owner_stats(&self, owner_id: OwnerId) -> AppResult<OwnerStats> {
        let state = self.state.read().await;
        let mut stats = OwnerStats::default();

        for file in state
            .files
            .values()
            .filter(|f| f.is_owned_by(owner_id) && !f.is_deleting())
        {
            stats.total_documents += 1;
            for revision in state.revisions.get(&file.id).into_iter().flat_map(|r| r.values()) {
                stats.record_revision(&revision.file_extension, revision.byte_size);
            }
        }
        Ok(stats)
    }
}
