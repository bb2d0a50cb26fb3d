//! Embedded schema migrations for the metadata tables.

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use tracing::info;

use revstore_core::error::{AppError, ErrorKind};
use revstore_core::result::AppResult;

/// Migrations compiled in from the workspace `migrations/` directory.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Bring the `file_documents` / `file_revisions` schema up to date.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    info!(known = MIGRATOR.iter().count(), "Applying metadata schema migrations");

    MIGRATOR.run(pool).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Database,
            "Failed to apply metadata schema migrations",
            e,
        )
    })?;

    info!("Metadata schema is up to date");
    Ok(())
}
