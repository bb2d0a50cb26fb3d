//! Revision-level commands: history, upload, download, verify.

use std::path::PathBuf;

use clap::Args;
use futures::StreamExt;
use serde::Serialize;
use tabled::Tabled;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use revstore_core::config::AppConfig;
use revstore_core::error::{AppError, ErrorKind};
use revstore_core::result::AppResult;
use revstore_core::types::{FileId, OwnerId};
use revstore_entity::FileRevision;
use revstore_service::UploadContent;

use crate::output::{self, OutputFormat};

/// Arguments for the revisions command
#[derive(Debug, Args)]
pub struct RevisionsArgs {
    /// Owner of the file
    #[arg(long)]
    pub owner: OwnerId,

    /// File whose history to list
    #[arg(long)]
    pub file: FileId,
}

/// Arguments for the upload command
#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Owner of the file
    #[arg(long)]
    pub owner: OwnerId,

    /// Local file to upload
    #[arg(long)]
    pub path: PathBuf,

    /// Existing file to add a revision to; omit to create a new file
    #[arg(long)]
    pub file: Option<FileId>,

    /// Display name for a new file (defaults to the local file name)
    #[arg(long)]
    pub name: Option<String>,

    /// MIME type (guessed from the extension when omitted)
    #[arg(long)]
    pub content_type: Option<String>,
}

/// Arguments for the download command
#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Owner of the file
    #[arg(long)]
    pub owner: OwnerId,

    /// File to download
    #[arg(long)]
    pub file: FileId,

    /// Revision number (latest when omitted)
    #[arg(long)]
    pub revision: Option<i32>,

    /// Directory to write into
    #[arg(long, default_value = ".")]
    pub out: PathBuf,
}

/// Arguments for the verify command
#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Owner of the file
    #[arg(long)]
    pub owner: OwnerId,

    /// File to check
    #[arg(long)]
    pub file: FileId,

    /// Revision number to check
    #[arg(long)]
    pub revision: i32,
}

/// Revision display row for table output
#[derive(Debug, Serialize, Tabled)]
struct RevisionRow {
    /// Revision number
    revision: i32,
    /// Upload time
    uploaded_at: String,
    /// Human-readable size
    size: String,
    /// MIME type
    content_type: String,
    /// Extension
    extension: String,
    /// Abbreviated SHA-256
    sha256: String,
}

impl From<&FileRevision> for RevisionRow {
    fn from(rev: &FileRevision) -> Self {
        Self {
            revision: rev.revision_number,
            uploaded_at: rev.uploaded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            size: rev.formatted_size(),
            content_type: rev.content_type.clone(),
            extension: rev.file_extension.clone(),
            sha256: rev
                .checksum_sha256
                .as_deref()
                .map(|c| c.chars().take(12).collect())
                .unwrap_or_default(),
        }
    }
}

/// List a file's revisions
pub async fn list(args: &RevisionsArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let services = super::connect(config).await?;
    let ctx = super::context(args.owner);

    let revisions = services.manager.list_revisions(&ctx, args.file).await?;

    match format {
        OutputFormat::Table => {
            let rows: Vec<RevisionRow> = revisions.iter().map(RevisionRow::from).collect();
            output::print_list(&rows, format);
        }
        OutputFormat::Json => output::print_record(&revisions, &[], format),
    }
    Ok(())
}

/// Upload a file or a new revision
pub async fn upload(args: &UploadArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let local = tokio::fs::File::open(&args.path).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Validation,
            format!("Cannot read {}", args.path.display()),
            e,
        )
    })?;
    let local_name = args
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut content = UploadContent::new(Box::pin(ReaderStream::new(local)));
    if !local_name.is_empty() {
        content = content.with_filename(local_name.clone());
    }
    if let Some(content_type) = &args.content_type {
        content = content.with_content_type(content_type.clone());
    }

    let services = super::connect(config).await?;
    let ctx = super::context(args.owner);

    let revision = match args.file {
        Some(file_id) => services.manager.add_revision(&ctx, file_id, content).await?,
        None => {
            let name = args.name.as_deref().unwrap_or(&local_name);
            services
                .manager
                .create_file(&ctx, name, content)
                .await?
                .latest_revision
        }
    };

    match format {
        OutputFormat::Table => output::print_success(&format!(
            "Stored revision {} of file {} ({})",
            revision.revision_number,
            revision.file_id,
            revision.formatted_size()
        )),
        OutputFormat::Json => output::print_record(&revision, &[], format),
    }
    Ok(())
}

/// Download a revision under its suggested filename
pub async fn download(args: &DownloadArgs, config: &AppConfig) -> AppResult<()> {
    let services = super::connect(config).await?;
    let ctx = super::context(args.owner);

    let download = services
        .manager
        .get_revision(&ctx, args.file, args.revision)
        .await?;

    let target = args.out.join(&download.suggested_filename);
    let mut out = tokio::fs::File::create(&target).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Storage,
            format!("Cannot create {}", target.display()),
            e,
        )
    })?;

    let mut stream = download.stream;
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| AppError::with_source(ErrorKind::Storage, "Blob read failed", e))?;
        out.write_all(&chunk).await?;
    }
    out.flush().await?;

    output::print_success(&format!(
        "Revision {} written to {} ({} bytes, {})",
        download.revision.revision_number,
        target.display(),
        download.byte_size,
        download.content_type
    ));
    Ok(())
}

/// Verify a revision's checksum
pub async fn verify(args: &VerifyArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let services = super::connect(config).await?;
    let ctx = super::context(args.owner);

    let report = services
        .manager
        .verify_revision(&ctx, args.file, args.revision)
        .await?;

    output::print_record(
        &report,
        &[
            ("Revision", report.revision_number.to_string()),
            ("Bytes read", report.byte_size.to_string()),
            ("Recorded SHA-256", report.expected_sha256.clone().unwrap_or_default()),
            ("Actual SHA-256", report.actual_sha256.clone()),
            ("Intact", report.intact.to_string()),
        ],
        format,
    );

    if report.intact {
        Ok(())
    } else {
        Err(AppError::storage(format!(
            "Revision {} of file {} is corrupted",
            report.revision_number, args.file
        )))
    }
}
