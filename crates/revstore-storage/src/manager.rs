//! Builds the configured blob store.

use std::sync::Arc;

use tracing::info;

use revstore_core::config::StorageConfig;
use revstore_core::error::AppError;
use revstore_core::result::AppResult;
use revstore_core::traits::blob::BlobStore;

use crate::providers::local::LocalBlobStore;

/// Owns the blob store selected by [`StorageConfig::provider`].
#[derive(Debug, Clone)]
pub struct BlobStoreManager {
    store: Arc<dyn BlobStore>,
    max_upload_size_bytes: u64,
}

impl BlobStoreManager {
    /// Instantiate the provider named in the configuration.
    pub async fn from_config(config: &StorageConfig) -> AppResult<Self> {
        let store: Arc<dyn BlobStore> = match config.provider.as_str() {
            "local" => Arc::new(LocalBlobStore::new(&config.local).await?),
            other => {
                return Err(AppError::configuration(format!(
                    "Unsupported storage provider '{other}'"
                )));
            }
        };

        info!(
            provider = store.provider_type(),
            max_upload_size_bytes = config.max_upload_size_bytes,
            "Blob store ready"
        );

        Ok(Self {
            store,
            max_upload_size_bytes: config.max_upload_size_bytes,
        })
    }

    /// Wrap an already-built store.
    pub fn with_store(store: Arc<dyn BlobStore>, max_upload_size_bytes: u64) -> Self {
        Self {
            store,
            max_upload_size_bytes,
        }
    }

    /// The active blob store.
    pub fn store(&self) -> Arc<dyn BlobStore> {
        Arc::clone(&self.store)
    }

    /// Largest accepted revision, in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_bytes
    }

    /// Check the active store's health, treating errors as unhealthy.
    pub async fn health_check(&self) -> bool {
        self.store.health_check().await.unwrap_or(false)
    }
}
