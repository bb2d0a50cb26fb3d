//! Database migration command.

use revstore_core::config::AppConfig;
use revstore_core::result::AppResult;
use revstore_database::{DatabasePool, migration};

use crate::output;

/// Run all pending migrations.
pub async fn execute(config: &AppConfig) -> AppResult<()> {
    let pool = DatabasePool::connect(&config.database).await?;

    println!("Running database migrations...");
    migration::run_migrations(pool.pool()).await?;
    output::print_success("All migrations applied successfully.");

    pool.close().await;
    Ok(())
}
