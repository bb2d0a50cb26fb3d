//! Maintenance command: deletion finisher, orphan reaper, temp purge.

use clap::Args;
use tracing::{error, info};

use revstore_core::config::AppConfig;
use revstore_core::result::AppResult;
use revstore_service::MaintenanceReport;

use crate::output::{self, OutputFormat};

/// Arguments for the maintenance command
#[derive(Debug, Args)]
pub struct MaintenanceArgs {
    /// Keep running every `maintenance.interval_seconds` until Ctrl-C
    #[arg(long = "loop")]
    pub run_loop: bool,
}

/// Execute the maintenance command
pub async fn execute(
    args: &MaintenanceArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> AppResult<()> {
    let services = super::connect(config).await?;
    let maintenance = services.maintenance;

    if !args.run_loop {
        let report = maintenance.run_once().await?;
        print_report(&report, format);
        return Ok(());
    }

    let mut ticker = tokio::time::interval(maintenance.interval());
    info!(interval_secs = maintenance.interval().as_secs(), "Maintenance loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match maintenance.run_once().await {
                    Ok(report) => info!(
                        deletions_finished = report.deletions_finished,
                        deletions_failed = report.deletions_failed,
                        orphans_removed = report.orphans_removed,
                        temp_files_removed = report.temp_files_removed,
                        "Maintenance pass complete"
                    ),
                    Err(e) => error!(error = %e, "Maintenance pass failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Maintenance loop stopped");
                return Ok(());
            }
        }
    }
}

fn print_report(report: &MaintenanceReport, format: OutputFormat) {
    output::print_record(
        report,
        &[
            ("Deletions finished", report.deletions_finished.to_string()),
            ("Deletions failed", report.deletions_failed.to_string()),
            ("Orphans removed", report.orphans_removed.to_string()),
            ("Temp files removed", report.temp_files_removed.to_string()),
        ],
        format,
    );
}
