//! The revision manager: creates files, appends revisions, resolves reads.
//!
//! Every write follows the same order: validate, check ownership, publish the
//! blob under a key unique to the new revision, then commit metadata. A
//! failure after publishing removes the blob again, best-effort; anything
//! left behind is unreferenced and collected by the orphan reaper.

use std::sync::Arc;

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use revstore_core::config::RevisionConfig;
use revstore_core::error::{AppError, ErrorKind};
use revstore_core::result::AppResult;
use revstore_core::traits::blob::{BlobStore, BlobWrite, ByteStream};
use revstore_core::types::{FileId, OwnerId, RevisionId};
use revstore_database::MetadataStore;
use revstore_entity::file::naming;
use revstore_entity::{FileDocument, FileRecord, FileRevision, NewFile, NewRevision, OwnerStats};
use revstore_storage::BlobStoreManager;

use super::deletion::complete_deletion;
use super::download::{RevisionDownload, RevisionVerification};
use super::retry::RetryPolicy;
use super::upload::{UploadContent, reject_empty};
use super::validation::{self, UploadPolicy};
use crate::context::RequestContext;

/// Blob key for a revision: `user_{owner}/{file}/{revision}{ext}`.
pub fn storage_key(owner_id: OwnerId, file_id: FileId, revision_id: RevisionId, ext: &str) -> String {
    format!("user_{owner_id}/{file_id}/{revision_id}{ext}")
}

/// Orchestrates the metadata store and the blob store.
#[derive(Debug, Clone)]
pub struct RevisionManager {
    /// File and revision records.
    metadata: Arc<dyn MetadataStore>,
    /// Revision content.
    blobs: Arc<dyn BlobStore>,
    /// Conflict retry policy.
    retry: RetryPolicy,
    /// Largest accepted revision in bytes.
    max_upload_size_bytes: u64,
    /// Allowlists and the per-owner quota.
    upload_policy: UploadPolicy,
}

impl RevisionManager {
    /// Creates a new revision manager.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: &BlobStoreManager,
        revisions: RevisionConfig,
    ) -> Self {
        Self {
            metadata,
            blobs: storage.store(),
            retry: RetryPolicy::new(revisions),
            max_upload_size_bytes: storage.max_upload_size_bytes(),
            upload_policy: UploadPolicy::default(),
        }
    }

    /// Restrict uploads to `policy`. Without one, any extension and content
    /// type is accepted and owners have no quota.
    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload_policy = policy;
        self
    }

    /// Creates a file together with its first revision.
    pub async fn create_file(
        &self,
        ctx: &RequestContext,
        display_name: &str,
        content: UploadContent,
    ) -> AppResult<FileDocument> {
        let display_name = validation::validate_display_name(display_name)?;
        let (file_extension, content_type) = self.prepare_upload(&content, &display_name)?;

        let file_id = FileId::new();
        let revision_id = RevisionId::new();
        let key = storage_key(ctx.owner_id, file_id, revision_id, &file_extension);
        let written = self.write_blob(ctx, &key, content.stream).await?;

        let file = NewFile {
            id: file_id,
            owner_id: ctx.owner_id,
            display_name,
        };
        let first = new_revision(revision_id, written, content_type, file_extension);

        let document = match self.metadata.create_file(file, first).await {
            Ok(document) => document,
            Err(e) => {
                self.discard_blob(&key).await;
                return Err(e);
            }
        };

        info!(
            owner_id = %ctx.owner_id,
            file_id = %document.id,
            name = %document.display_name,
            size = document.latest_revision.byte_size,
            "File created"
        );
        Ok(document)
    }

    /// Appends a revision to an existing file.
    pub async fn add_revision(
        &self,
        ctx: &RequestContext,
        file_id: FileId,
        content: UploadContent,
    ) -> AppResult<FileRevision> {
        let record = self.authorize(ctx, file_id).await?;

        let (file_extension, content_type) =
            self.prepare_upload(&content, &record.display_name)?;

        let revision_id = RevisionId::new();
        let key = storage_key(ctx.owner_id, file_id, revision_id, &file_extension);
        let written = self.write_blob(ctx, &key, content.stream).await?;
        let revision = new_revision(revision_id, written, content_type, file_extension);

        let inserted = self
            .retry
            .run("add_revision", || {
                self.metadata
                    .insert_next_revision(file_id, revision.clone())
            })
            .await;

        let inserted = match inserted {
            Ok(inserted) => inserted,
            Err(e) => {
                self.discard_blob(&key).await;
                return Err(e);
            }
        };

        info!(
            owner_id = %ctx.owner_id,
            file_id = %file_id,
            revision = inserted.revision_number,
            size = inserted.byte_size,
            "Revision added"
        );
        Ok(inserted)
    }

    /// Resolves a revision (the latest when `revision_number` is `None`) and
    /// opens its content.
    pub async fn get_revision(
        &self,
        ctx: &RequestContext,
        file_id: FileId,
        revision_number: Option<i32>,
    ) -> AppResult<RevisionDownload> {
        if let Some(n) = revision_number.filter(|&n| n <= 0) {
            return Err(AppError::validation(format!(
                "Revision number must be positive, got {n}"
            )));
        }

        let record = self.authorize(ctx, file_id).await?;

        let latest = self
            .metadata
            .latest_revision(file_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File {file_id} not found")))?;

        let revision = match revision_number {
            None => latest.clone(),
            Some(n) if n == latest.revision_number => latest.clone(),
            Some(n) => self
                .metadata
                .find_revision(file_id, n)
                .await?
                .ok_or_else(|| {
                    AppError::not_found(format!("Revision {n} of file {file_id} not found"))
                })?,
        };
        let is_latest = revision.revision_number == latest.revision_number;

        let stream = self.open_blob(&revision).await?;

        Ok(RevisionDownload {
            suggested_filename: naming::suggested_filename(
                &record.display_name,
                &revision.file_extension,
                revision.revision_number,
                is_latest,
            ),
            content_type: revision.content_type.clone(),
            file_extension: revision.file_extension.clone(),
            byte_size: revision.byte_size,
            is_latest,
            revision,
            stream,
        })
    }

    /// Lists a file's revisions in ascending order.
    pub async fn list_revisions(
        &self,
        ctx: &RequestContext,
        file_id: FileId,
    ) -> AppResult<Vec<FileRevision>> {
        self.authorize(ctx, file_id).await?;

        let revisions = self.metadata.list_revisions(file_id).await?;
        if revisions.is_empty() {
            // Deleted between the ownership check and the read.
            return Err(AppError::not_found(format!("File {file_id} not found")));
        }
        Ok(revisions)
    }

    /// Deletes a file, all of its revisions and their blobs.
    ///
    /// The document disappears from every read as soon as it is tombstoned.
    /// If a blob cannot be removed the error is returned and the deletion is
    /// finished later by the maintenance pass.
    pub async fn delete_file(&self, ctx: &RequestContext, file_id: FileId) -> AppResult<()> {
        self.authorize(ctx, file_id).await?;

        if !self.metadata.mark_deleting(file_id).await? {
            return Err(AppError::not_found(format!("File {file_id} not found")));
        }
        info!(owner_id = %ctx.owner_id, file_id = %file_id, "File marked for deletion");

        complete_deletion(self.metadata.as_ref(), self.blobs.as_ref(), file_id).await
    }

    /// Returns a file with its latest revision and revision count.
    pub async fn get_file(&self, ctx: &RequestContext, file_id: FileId) -> AppResult<FileDocument> {
        self.authorize(ctx, file_id).await?;
        self.load_document(file_id).await
    }

    /// Lists the caller's files, most recently updated first.
    pub async fn list_files(
        &self,
        ctx: &RequestContext,
        search: Option<&str>,
    ) -> AppResult<Vec<FileDocument>> {
        self.metadata.list_files(ctx.owner_id, search).await
    }

    /// Changes a file's display name.
    pub async fn rename_file(
        &self,
        ctx: &RequestContext,
        file_id: FileId,
        new_name: &str,
    ) -> AppResult<FileDocument> {
        let new_name = validation::validate_display_name(new_name)?;
        let record = self.authorize(ctx, file_id).await?;

        self.metadata.rename_file(file_id, &new_name).await?;
        info!(
            owner_id = %ctx.owner_id,
            file_id = %file_id,
            from = %record.display_name,
            to = %new_name,
            "File renamed"
        );
        self.load_document(file_id).await
    }

    /// Aggregate statistics over the caller's files.
    pub async fn owner_stats(&self, ctx: &RequestContext) -> AppResult<OwnerStats> {
        self.metadata.owner_stats(ctx.owner_id).await
    }

    /// Re-reads a revision and compares it with its recorded checksum and size.
    pub async fn verify_revision(
        &self,
        ctx: &RequestContext,
        file_id: FileId,
        revision_number: i32,
    ) -> AppResult<RevisionVerification> {
        let download = self
            .get_revision(ctx, file_id, Some(revision_number))
            .await?;
        let revision = download.revision;
        let mut stream = download.stream;

        let mut hasher = Sha256::new();
        let mut byte_size = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| AppError::with_source(ErrorKind::Storage, "Blob read failed", e))?;
            byte_size += chunk.len() as u64;
            hasher.update(&chunk);
        }
        let actual_sha256 = hex::encode(hasher.finalize());

        let intact = byte_size == revision.byte_size.max(0) as u64
            && revision
                .checksum_sha256
                .as_deref()
                .is_none_or(|expected| expected == actual_sha256);

        if !intact {
            warn!(
                file_id = %file_id,
                revision = revision.revision_number,
                "Stored content does not match its record"
            );
        }

        Ok(RevisionVerification {
            revision_number: revision.revision_number,
            expected_sha256: revision.checksum_sha256,
            actual_sha256,
            byte_size,
            intact,
        })
    }

    /// Load a live file for `ctx`: `NotFound` if it does not exist,
    /// `Forbidden` if someone else owns it.
    async fn authorize(&self, ctx: &RequestContext, file_id: FileId) -> AppResult<FileRecord> {
        let record = self
            .metadata
            .find_file(file_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File {file_id} not found")))?;

        if !record.is_owned_by(ctx.owner_id) {
            warn!(
                owner_id = %ctx.owner_id,
                file_id = %file_id,
                request_id = %ctx.request_id,
                "Access to another owner's file denied"
            );
            return Err(AppError::forbidden(format!(
                "File {file_id} belongs to another user"
            )));
        }
        Ok(record)
    }

    async fn load_document(&self, file_id: FileId) -> AppResult<FileDocument> {
        self.metadata
            .load_document(file_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File {file_id} not found")))
    }

    /// Extension and content type to record for an upload, checked against
    /// the upload policy.
    fn prepare_upload(
        &self,
        content: &UploadContent,
        display_name: &str,
    ) -> AppResult<(String, String)> {
        let file_extension =
            validation::upload_extension(content.filename.as_deref(), display_name);
        let content_type =
            validation::resolve_content_type(content.content_type.as_deref(), &file_extension)?;
        self.upload_policy.check_extension(&file_extension)?;
        self.upload_policy.check_content_type(&content_type)?;
        Ok((file_extension, content_type))
    }

    /// Publish an upload under `key`, capped at the per-revision limit or the
    /// remainder of the owner's quota, whichever is smaller.
    ///
    /// The quota is checked against committed revisions only, so concurrent
    /// uploads by one owner can overshoot it by at most one revision each.
    async fn write_blob(
        &self,
        ctx: &RequestContext,
        key: &str,
        stream: ByteStream,
    ) -> AppResult<BlobWrite> {
        let Some(quota) = self.upload_policy.owner_quota_bytes() else {
            let stream = reject_empty(stream).await?;
            return self
                .blobs
                .put(key, stream, Some(self.max_upload_size_bytes))
                .await;
        };

        let used = self.metadata.owner_stats(ctx.owner_id).await?.total_bytes;
        let remaining = quota.saturating_sub(used);
        if remaining == 0 {
            return Err(quota_exceeded(quota, used));
        }

        let stream = reject_empty(stream).await?;
        if remaining >= self.max_upload_size_bytes {
            return self
                .blobs
                .put(key, stream, Some(self.max_upload_size_bytes))
                .await;
        }
        match self.blobs.put(key, stream, Some(remaining)).await {
            Err(e) if e.kind == ErrorKind::Validation => Err(quota_exceeded(quota, used)),
            result => result,
        }
    }

    /// Open a revision's blob. A missing blob is only `NotFound` if the file
    /// itself went away in the meantime; otherwise it is a storage fault.
    async fn open_blob(&self, revision: &FileRevision) -> AppResult<ByteStream> {
        match self.blobs.get(&revision.storage_key).await {
            Ok(stream) => Ok(stream),
            Err(e) if e.kind == ErrorKind::NotFound => {
                if self.metadata.find_file(revision.file_id).await?.is_none() {
                    return Err(AppError::not_found(format!(
                        "File {} not found",
                        revision.file_id
                    )));
                }
                Err(AppError::storage(format!(
                    "Content of revision {} of file {} is missing",
                    revision.revision_number, revision.file_id
                )))
            }
            Err(e) => Err(e),
        }
    }

    async fn discard_blob(&self, key: &str) {
        if let Err(e) = self.blobs.delete(key).await {
            warn!(storage_key = %key, error = %e, "Failed to discard uncommitted blob");
        }
    }
}

fn quota_exceeded(quota: u64, used: u64) -> AppError {
    AppError::validation(format!(
        "Storage quota exceeded: {} of {} used",
        naming::format_size(used),
        naming::format_size(quota)
    ))
}

fn new_revision(
    id: RevisionId,
    written: BlobWrite,
    content_type: String,
    file_extension: String,
) -> NewRevision {
    NewRevision {
        id,
        byte_size: written.size_bytes as i64,
        content_type,
        file_extension,
        storage_key: written.key,
        checksum_sha256: Some(written.checksum_sha256),
    }
}
