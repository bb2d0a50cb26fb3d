//! Local filesystem blob store.
//!
//! Writes stream into `{root}/{temp_dir}/{uuid}.part`, are optionally
//! `fsync`ed, and are then renamed to `{root}/{key}`. The rename is the
//! publish step: a crash before it leaves only a temp file for
//! [`BlobStore::purge_temp`] to collect.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::stream::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use revstore_core::config::LocalStorageConfig;
use revstore_core::error::{AppError, ErrorKind};
use revstore_core::result::AppResult;
use revstore_core::traits::blob::{BlobInfo, BlobStore, BlobWrite, ByteStream};

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    /// Root directory for published blobs.
    root: PathBuf,
    /// Directory for in-flight writes, inside `root`.
    temp_root: PathBuf,
    /// Name of `temp_root` relative to `root`; keys may not start with it.
    temp_dir: String,
    fsync: bool,
}

impl LocalBlobStore {
    /// Create a store from configuration, creating the directories if needed.
    pub async fn new(config: &LocalStorageConfig) -> AppResult<Self> {
        let temp_dir = config.temp_dir.trim_matches('/').to_string();
        if temp_dir.is_empty() || temp_dir.contains(['/', '\\']) || temp_dir == ".." {
            return Err(AppError::configuration(format!(
                "Invalid temp directory name '{}'",
                config.temp_dir
            )));
        }

        let root = PathBuf::from(&config.root_path);
        let temp_root = root.join(&temp_dir);
        fs::create_dir_all(&temp_root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create storage root: {}", root.display()),
                e,
            )
        })?;

        Ok(Self {
            root,
            temp_root,
            temp_dir,
            fsync: config.fsync,
        })
    }

    /// Create a store at `root` with default settings.
    pub async fn open(root: impl AsRef<Path>) -> AppResult<Self> {
        Self::new(&LocalStorageConfig {
            root_path: root.as_ref().to_string_lossy().into_owned(),
            ..LocalStorageConfig::default()
        })
        .await
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path inside the root, rejecting anything that could
    /// escape it or land in the temp area.
    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        let invalid = || AppError::validation(format!("Invalid storage key '{key}'"));

        if key.is_empty() || key.contains('\\') || key.contains('\0') {
            return Err(invalid());
        }
        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid());
        }
        if relative.starts_with(&self.temp_dir) {
            return Err(invalid());
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    /// Stream `data` into `file`, hashing as it goes.
    async fn write_temp(
        &self,
        file: &mut fs::File,
        mut data: ByteStream,
        max_bytes: Option<u64>,
    ) -> AppResult<(u64, String)> {
        let mut hasher = Sha256::new();
        let mut total = 0u64;

        while let Some(chunk) = data.next().await {
            let chunk = chunk
                .map_err(|e| AppError::with_source(ErrorKind::Storage, "Upload stream failed", e))?;
            total += chunk.len() as u64;
            if let Some(limit) = max_bytes.filter(|&limit| total > limit) {
                return Err(AppError::validation(format!(
                    "Upload exceeds the maximum size of {limit} bytes"
                )));
            }
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to write chunk", e)
            })?;
        }

        file.flush()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Storage, "Failed to flush blob", e))?;
        if self.fsync {
            file.sync_all()
                .await
                .map_err(|e| AppError::with_source(ErrorKind::Storage, "Failed to sync blob", e))?;
        }

        Ok((total, hex::encode(hasher.finalize())))
    }

    /// Persist the directory entry created by a rename.
    async fn sync_dir(&self, dir: &Path) -> AppResult<()> {
        if !self.fsync || !cfg!(unix) {
            return Ok(());
        }
        let handle = fs::File::open(dir).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to open directory: {}", dir.display()),
                e,
            )
        })?;
        handle.sync_all().await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to sync directory: {}", dir.display()),
                e,
            )
        })
    }

    /// Remove now-empty directories between `path` and the root.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

/// Remove an unpublished temp file. Failures only leave work for `purge_temp`.
async fn discard_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to discard temp file");
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn provider_type(&self) -> &str {
        "local"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self.root.is_dir() && self.temp_root.is_dir())
    }

    async fn put(
        &self,
        key: &str,
        data: ByteStream,
        max_bytes: Option<u64>,
    ) -> AppResult<BlobWrite> {
        let target = self.resolve(key)?;

        fs::create_dir_all(&self.temp_root).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to create temp directory", e)
        })?;
        let temp_path = self.temp_root.join(format!("{}.part", Uuid::new_v4()));
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create temp file: {}", temp_path.display()),
                e,
            )
        })?;

        let written = self.write_temp(&mut file, data, max_bytes).await;
        drop(file);

        let (size_bytes, checksum_sha256) = match written {
            Ok(written) => written,
            Err(e) => {
                discard_temp(&temp_path).await;
                return Err(e);
            }
        };

        let publish = async {
            if fs::try_exists(&target).await.unwrap_or(false) {
                return Err(AppError::conflict(format!("Blob '{key}' already exists")));
            }
            self.ensure_parent(&target).await?;
            let mut renamed = fs::rename(&temp_path, &target).await;
            if matches!(&renamed, Err(e) if e.kind() == std::io::ErrorKind::NotFound) {
                // A concurrent delete pruned the freshly created parent.
                self.ensure_parent(&target).await?;
                renamed = fs::rename(&temp_path, &target).await;
            }
            renamed.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to publish blob: {key}"),
                    e,
                )
            })
        };
        if let Err(e) = publish.await {
            discard_temp(&temp_path).await;
            return Err(e);
        }

        if let Some(parent) = target.parent() {
            self.sync_dir(parent).await?;
        }

        debug!(key, bytes = size_bytes, "Published blob");
        Ok(BlobWrite {
            key: key.to_string(),
            size_bytes,
            checksum_sha256,
        })
    }

    async fn get(&self, key: &str) -> AppResult<ByteStream> {
        let path = self.resolve(key)?;
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Blob not found: {key}"))
            } else {
                AppError::with_source(ErrorKind::Storage, format!("Failed to open blob: {key}"), e)
            }
        })?;

        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "Deleted blob");
                self.prune_empty_parents(&path).await;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to delete blob: {key}"),
                e,
            )),
        }
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let path = self.resolve(key)?;
        fs::try_exists(&path).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to stat blob: {key}"), e)
        })
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<BlobInfo>> {
        let mut blobs = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(AppError::with_source(
                        ErrorKind::Storage,
                        format!("Failed to list directory: {}", dir.display()),
                        e,
                    ));
                }
            };

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to read directory entry", e)
            })? {
                let path = entry.path();
                if path == self.temp_root {
                    continue;
                }
                let meta = entry.metadata().await.map_err(|e| {
                    AppError::with_source(ErrorKind::Storage, "Failed to get entry metadata", e)
                })?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if !key.starts_with(prefix) {
                    continue;
                }

                blobs.push(BlobInfo {
                    key,
                    size_bytes: meta.len(),
                    last_modified: meta.modified().ok().map(chrono::DateTime::from),
                });
            }
        }

        blobs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(blobs)
    }

    async fn purge_temp(&self, max_age: Duration) -> AppResult<u64> {
        let mut entries = match fs::read_dir(&self.temp_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    "Failed to list temp directory",
                    e,
                ));
            }
        };

        let now = SystemTime::now();
        let mut removed = 0u64;
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to read directory entry", e)
        })? {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if !meta.is_file() || age < max_age {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to purge temp file")
                }
            }
        }

        if removed > 0 {
            debug!(removed, "Purged abandoned temp files");
        }
        Ok(removed)
    }
}
