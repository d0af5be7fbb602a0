//! Recover command - resolve mutations interrupted by a crash

use anyhow::{Context, Result};
use colored::Colorize;
use wallet_core::LoggingService;

use super::{load_config, log_recovery, open_context};
use crate::output;

pub async fn run(logger: &Option<LoggingService>, json: bool) -> Result<()> {
    // Open without the startup pass so this run reports what it resolved
    let mut config = load_config()?;
    config.ledger.recover_on_startup = false;
    let ctx = open_context(logger, config).await?;

    let report = ctx
        .recovery
        .resolve_pending()
        .await
        .context("Recovery pass failed")?;
    log_recovery(logger, &report);

    if json {
        return output::json(&report);
    }

    if report.is_empty() {
        output::info("Nothing to recover.");
        return Ok(());
    }

    println!("{}", "Recovery".bold());
    println!("  Completed:   {}", report.completed);
    println!("  Rolled back: {}", report.rolled_back);
    println!("  Partial:     {}", report.partial);
    println!("  Deferred:    {}", report.deferred);

    if report.partial > 0 {
        output::warning("Some legs were overwritten since the crash and could not be restored.");
    }
    if report.deferred > 0 {
        output::warning("Some intents could not be resolved now; run recover again later.");
    }
    Ok(())
}
