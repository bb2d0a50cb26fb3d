//! Maintenance service.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use revstore_core::config::MaintenanceConfig;
use revstore_core::result::AppResult;
use revstore_core::traits::blob::BlobStore;
use revstore_database::MetadataStore;

use crate::file::deletion::complete_deletion;

/// What one maintenance pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Tombstoned files whose deletion was completed.
    pub deletions_finished: u64,
    /// Tombstoned files that still could not be completed.
    pub deletions_failed: u64,
    /// Unreferenced blobs removed.
    pub orphans_removed: u64,
    /// Abandoned temporary writes removed.
    pub temp_files_removed: u64,
}

/// Repairs the states a crash or a failed blob delete can leave behind.
#[derive(Debug, Clone)]
pub struct MaintenanceService {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    config: MaintenanceConfig,
}

impl MaintenanceService {
    /// Creates a new maintenance service.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            metadata,
            blobs,
            config,
        }
    }

    /// Complete every deletion that was interrupted after its tombstone was
    /// written. Returns `(finished, failed)`.
    pub async fn finish_pending_deletions(&self) -> AppResult<(u64, u64)> {
        let pending = self.metadata.find_deleting().await?;
        let mut finished = 0u64;
        let mut failed = 0u64;

        for file in pending {
            match complete_deletion(self.metadata.as_ref(), self.blobs.as_ref(), file.id).await {
                Ok(()) => finished += 1,
                Err(e) => {
                    failed += 1;
                    warn!(file_id = %file.id, error = %e, "Pending deletion still failing");
                }
            }
        }

        if finished > 0 || failed > 0 {
            info!(finished, failed, "Pending deletions processed");
        }
        Ok((finished, failed))
    }

    /// Delete blobs that no revision references and that are older than the
    /// grace period. Younger blobs may belong to a write whose metadata
    /// commit is still in flight.
    pub async fn reap_orphans(&self) -> AppResult<u64> {
        let grace = chrono::Duration::seconds(
            i64::try_from(self.config.orphan_grace_seconds).unwrap_or(i64::MAX),
        );
        let cutoff = Utc::now().checked_sub_signed(grace);
        let mut removed = 0u64;

        for blob in self.blobs.list("").await? {
            let old_enough = match (blob.last_modified, cutoff) {
                (Some(modified), Some(cutoff)) => modified <= cutoff,
                _ => false,
            };
            if !old_enough || self.metadata.is_storage_key_referenced(&blob.key).await? {
                continue;
            }

            match self.blobs.delete(&blob.key).await {
                Ok(()) => {
                    removed += 1;
                    debug!(storage_key = %blob.key, "Removed orphaned blob");
                }
                Err(e) => warn!(storage_key = %blob.key, error = %e, "Failed to remove orphaned blob"),
            }
        }

        if removed > 0 {
            info!(removed, "Orphaned blobs reaped");
        }
        Ok(removed)
    }

    /// Remove abandoned temporary writes.
    pub async fn purge_temp(&self) -> AppResult<u64> {
        self.blobs
            .purge_temp(Duration::from_secs(self.config.temp_max_age_seconds))
            .await
    }

    /// Run all maintenance steps once.
    ///
    /// Deletions are finished before orphans are reaped so that blobs of
    /// tombstoned files go through the ordered path.
    pub async fn run_once(&self) -> AppResult<MaintenanceReport> {
        let (deletions_finished, deletions_failed) = self.finish_pending_deletions().await?;
        let orphans_removed = self.reap_orphans().await?;
        let temp_files_removed = self.purge_temp().await?;

        Ok(MaintenanceReport {
            deletions_finished,
            deletions_failed,
            orphans_removed,
            temp_files_removed,
        })
    }

    /// Interval between passes when running continuously.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_seconds.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revstore_core::traits::blob::bytes_stream;
    use revstore_core::types::{FileId, OwnerId, RevisionId};
    use revstore_database::MemoryMetadataStore;
    use revstore_entity::{NewFile, NewRevision};
    use revstore_storage::LocalBlobStore;

    fn config(orphan_grace_seconds: u64) -> MaintenanceConfig {
        MaintenanceConfig {
            orphan_grace_seconds,
            temp_max_age_seconds: 0,
            interval_seconds: 60,
        }
    }

    async fn seed_file(
        metadata: &MemoryMetadataStore,
        blobs: &LocalBlobStore,
        key: &str,
    ) -> FileId {
        let written = blobs.put(key, bytes_stream("data"), None).await.unwrap();
        let id = FileId::new();
        metadata
            .create_file(
                NewFile {
                    id,
                    owner_id: OwnerId::new(),
                    display_name: "a.txt".to_string(),
                },
                NewRevision {
                    id: RevisionId::new(),
                    byte_size: written.size_bytes as i64,
                    content_type: "text/plain".to_string(),
                    file_extension: ".txt".to_string(),
                    storage_key: written.key,
                    checksum_sha256: Some(written.checksum_sha256),
                },
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_reaper_removes_only_unreferenced_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(LocalBlobStore::open(dir.path()).await.unwrap());
        let metadata = Arc::new(MemoryMetadataStore::new());

        seed_file(&metadata, &blobs, "user_a/f/kept.txt").await;
        blobs
            .put("user_a/f/orphan.txt", bytes_stream("lost"), None)
            .await
            .unwrap();

        let service = MaintenanceService::new(metadata.clone(), blobs.clone(), config(0));
        assert_eq!(service.reap_orphans().await.unwrap(), 1);
        assert!(blobs.exists("user_a/f/kept.txt").await.unwrap());
        assert!(!blobs.exists("user_a/f/orphan.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_reaper_respects_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(LocalBlobStore::open(dir.path()).await.unwrap());
        blobs
            .put("fresh.txt", bytes_stream("in flight"), None)
            .await
            .unwrap();

        let service =
            MaintenanceService::new(Arc::new(MemoryMetadataStore::new()), blobs.clone(), config(3600));
        assert_eq!(service.reap_orphans().await.unwrap(), 0);
        assert!(blobs.exists("fresh.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_finishes_interrupted_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(LocalBlobStore::open(dir.path()).await.unwrap());
        let metadata = Arc::new(MemoryMetadataStore::new());

        let file_id = seed_file(&metadata, &blobs, "user_b/f/r1.txt").await;
        metadata.mark_deleting(file_id).await.unwrap();

        let service = MaintenanceService::new(metadata.clone(), blobs.clone(), config(3600));
        let report = service.run_once().await.unwrap();

        assert_eq!(report.deletions_finished, 1);
        assert_eq!(report.deletions_failed, 0);
        assert!(metadata.find_file_any(file_id).await.unwrap().is_none());
        assert!(!blobs.exists("user_b/f/r1.txt").await.unwrap());
    }
}
