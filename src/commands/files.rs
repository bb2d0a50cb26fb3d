//! File-level commands: listing, statistics, rename, delete.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use revstore_core::config::AppConfig;
use revstore_core::result::AppResult;
use revstore_core::types::{FileId, OwnerId};
use revstore_entity::FileDocument;
use revstore_entity::file::naming::format_size;

use crate::output::{self, OutputFormat};

/// Arguments for the files command
#[derive(Debug, Args)]
pub struct FilesArgs {
    /// Owner whose files to list
    #[arg(long)]
    pub owner: OwnerId,

    /// Case-insensitive substring of the display name
    #[arg(long)]
    pub search: Option<String>,
}

/// Arguments for the stats command
#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Owner to report on
    #[arg(long)]
    pub owner: OwnerId,
}

/// Arguments for the rename command
#[derive(Debug, Args)]
pub struct RenameArgs {
    /// Owner of the file
    #[arg(long)]
    pub owner: OwnerId,

    /// File to rename
    #[arg(long)]
    pub file: FileId,

    /// New display name
    #[arg(long)]
    pub name: String,
}

/// Arguments for the delete command
#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Owner of the file
    #[arg(long)]
    pub owner: OwnerId,

    /// File to delete
    #[arg(long)]
    pub file: FileId,
}

/// File display row for table output
#[derive(Debug, Serialize, Tabled)]
struct FileRow {
    /// File ID
    id: String,
    /// Display name
    name: String,
    /// Number of revisions
    revisions: i64,
    /// Latest revision number
    latest: i32,
    /// Size of the latest revision
    size: String,
    /// Last update
    updated_at: String,
}

impl From<&FileDocument> for FileRow {
    fn from(doc: &FileDocument) -> Self {
        Self {
            id: doc.id.to_string(),
            name: doc.display_name.clone(),
            revisions: doc.revision_count,
            latest: doc.latest_revision.revision_number,
            size: doc.latest_revision.formatted_size(),
            updated_at: doc.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Extension count row for the stats table
#[derive(Debug, Serialize, Tabled)]
struct ExtensionRow {
    /// Extension without the dot
    extension: String,
    /// Revisions with this extension
    revisions: u64,
}

/// List an owner's files
pub async fn list(args: &FilesArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let services = super::connect(config).await?;
    let ctx = super::context(args.owner);

    let files = services
        .manager
        .list_files(&ctx, args.search.as_deref())
        .await?;

    match format {
        OutputFormat::Table => {
            let rows: Vec<FileRow> = files.iter().map(FileRow::from).collect();
            output::print_list(&rows, format);
        }
        OutputFormat::Json => output::print_record(&files, &[], format),
    }
    Ok(())
}

/// Show owner statistics
pub async fn stats(args: &StatsArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let services = super::connect(config).await?;
    let ctx = super::context(args.owner);

    let stats = services.manager.owner_stats(&ctx).await?;

    output::print_record(
        &stats,
        &[
            ("Documents", stats.total_documents.to_string()),
            ("Revisions", stats.total_revisions.to_string()),
            ("Total size", format_size(stats.total_bytes)),
        ],
        format,
    );

    if format == OutputFormat::Table && !stats.by_extension.is_empty() {
        let rows: Vec<ExtensionRow> = stats
            .by_extension
            .iter()
            .map(|(extension, revisions)| ExtensionRow {
                extension: extension.clone(),
                revisions: *revisions,
            })
            .collect();
        output::print_list(&rows, format);
    }
    Ok(())
}

/// Rename a file
pub async fn rename(args: &RenameArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let services = super::connect(config).await?;
    let ctx = super::context(args.owner);

    let doc = services
        .manager
        .rename_file(&ctx, args.file, &args.name)
        .await?;

    match format {
        OutputFormat::Table => {
            output::print_success(&format!("File {} renamed to '{}'", doc.id, doc.display_name))
        }
        OutputFormat::Json => output::print_record(&doc, &[], format),
    }
    Ok(())
}

/// Delete a file
pub async fn delete(args: &DeleteArgs, config: &AppConfig) -> AppResult<()> {
    let services = super::connect(config).await?;
    let ctx = super::context(args.owner);

    services.manager.delete_file(&ctx, args.file).await?;
    output::print_success(&format!("File {} deleted", args.file));
    Ok(())
}
