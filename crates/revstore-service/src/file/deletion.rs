//! Second half of file deletion: blobs first, rows last.

use tracing::{info, warn};

use revstore_core::result::AppResult;
use revstore_core::traits::blob::BlobStore;
use revstore_core::types::FileId;
use revstore_database::MetadataStore;

/// Delete every blob of a tombstoned document, then purge its rows.
///
/// Stops at the first blob that cannot be deleted, leaving the tombstone and
/// all rows in place so the deletion can be finished later. Blobs that are
/// already gone count as deleted.
pub async fn complete_deletion(
    metadata: &dyn MetadataStore,
    blobs: &dyn BlobStore,
    file_id: FileId,
) -> AppResult<()> {
    let keys = metadata.storage_keys(file_id).await?;

    for key in &keys {
        if let Err(e) = blobs.delete(key).await {
            warn!(
                file_id = %file_id,
                storage_key = %key,
                error = %e,
                "Blob delete failed; deletion left pending"
            );
            return Err(e);
        }
    }

    metadata.purge_file(file_id).await?;
    info!(file_id = %file_id, blobs = keys.len(), "File purged");
    Ok(())
}
