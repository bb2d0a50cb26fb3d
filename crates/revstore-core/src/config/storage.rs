//! Blob storage configuration.

use serde::{Deserialize, Serialize};

/// Top-level storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend used for revision blobs. Only `"local"` ships today.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Maximum size of a single revision in bytes (default 10 MiB).
    #[serde(default = "default_max_upload")]
    pub max_upload_size_bytes: u64,
    /// Extensions (without the dot, case-insensitive) a revision may carry.
    /// Empty accepts any.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    /// MIME types (`type/subtype`, parameters ignored) a revision may carry.
    /// Empty accepts any.
    #[serde(default)]
    pub allowed_content_types: Vec<String>,
    /// Bytes one owner may keep across all revisions of all files.
    /// Unset means unlimited.
    #[serde(default)]
    pub owner_quota_bytes: Option<u64>,
    /// Local filesystem storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            max_upload_size_bytes: default_max_upload(),
            allowed_extensions: Vec::new(),
            allowed_content_types: Vec::new(),
            owner_quota_bytes: None,
            local: LocalStorageConfig::default(),
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Root path for published blobs.
    #[serde(default = "default_local_root")]
    pub root_path: String,
    /// Directory name, under the root, for in-flight writes.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
    /// Call `fsync` on blob data and the parent directory before publishing.
    #[serde(default = "default_true")]
    pub fsync: bool,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_path: default_local_root(),
            temp_dir: default_temp_dir(),
            fsync: true,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_max_upload() -> u64 {
    10_485_760 // 10 MiB
}

fn default_local_root() -> String {
    "./data/blobs".to_string()
}

fn default_temp_dir() -> String {
    ".tmp".to_string()
}

fn default_true() -> bool {
    true
}
