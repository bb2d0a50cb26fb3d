//! CLI command definitions and dispatch.

pub mod files;
pub mod maintenance;
pub mod migrate;
pub mod revisions;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use revstore_core::config::AppConfig;
use revstore_core::result::AppResult;
use revstore_core::types::OwnerId;
use revstore_database::DatabasePool;
use revstore_service::{MaintenanceService, RequestContext, RevisionManager, UploadPolicy};
use revstore_storage::BlobStoreManager;

use crate::output::OutputFormat;

/// RevStore: file storage with per-file revision history
#[derive(Debug, Parser)]
#[command(name = "revstore", version, about, long_about = None)]
pub struct Cli {
    /// Directory holding default.toml and the environment overlays
    #[arg(short, long, default_value = "config")]
    pub config: String,

    /// Environment overlay to apply (config/{env}.toml)
    #[arg(short, long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run pending database migrations
    Migrate,
    /// List an owner's files
    Files(files::FilesArgs),
    /// Show storage statistics for an owner
    Stats(files::StatsArgs),
    /// Rename a file
    Rename(files::RenameArgs),
    /// Delete a file with all of its revisions
    Delete(files::DeleteArgs),
    /// List a file's revisions
    Revisions(revisions::RevisionsArgs),
    /// Upload a new file, or a new revision of an existing one
    Upload(revisions::UploadArgs),
    /// Download a revision
    Download(revisions::DownloadArgs),
    /// Re-hash a stored revision and compare it with its record
    Verify(revisions::VerifyArgs),
    /// Finish interrupted deletions and reap orphaned blobs
    Maintenance(maintenance::MaintenanceArgs),
}

impl Cli {
    /// Load configuration for the selected directory and environment.
    pub fn load_config(&self) -> AppResult<AppConfig> {
        AppConfig::load_from(&self.config, &self.env)
    }

    /// Execute the CLI command
    pub async fn execute(&self, config: AppConfig) -> AppResult<()> {
        match &self.command {
            Commands::Migrate => migrate::execute(&config).await,
            Commands::Files(args) => files::list(args, &config, self.format).await,
            Commands::Stats(args) => files::stats(args, &config, self.format).await,
            Commands::Rename(args) => files::rename(args, &config, self.format).await,
            Commands::Delete(args) => files::delete(args, &config).await,
            Commands::Revisions(args) => revisions::list(args, &config, self.format).await,
            Commands::Upload(args) => revisions::upload(args, &config, self.format).await,
            Commands::Download(args) => revisions::download(args, &config).await,
            Commands::Verify(args) => revisions::verify(args, &config, self.format).await,
            Commands::Maintenance(args) => maintenance::execute(args, &config, self.format).await,
        }
    }
}

/// Services wired against the configured database and blob store.
pub struct Services {
    /// The revision manager.
    pub manager: RevisionManager,
    /// The maintenance service.
    pub maintenance: MaintenanceService,
}

/// Helper: connect the metadata and blob stores and build the services.
pub async fn connect(config: &AppConfig) -> AppResult<Services> {
    let pool = DatabasePool::connect(&config.database).await?;
    let metadata = Arc::new(pool.metadata_store());
    let storage = BlobStoreManager::from_config(&config.storage).await?;

    Ok(Services {
        manager: RevisionManager::new(metadata.clone(), &storage, config.revisions.clone())
            .with_upload_policy(UploadPolicy::from_config(&config.storage)),
        maintenance: MaintenanceService::new(
            metadata,
            storage.store(),
            config.maintenance.clone(),
        ),
    })
}

/// Helper: request context for an owner given on the command line.
pub fn context(owner: OwnerId) -> RequestContext {
    RequestContext::new(owner)
}
