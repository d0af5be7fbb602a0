//! CLI command implementations

pub mod history;
pub mod ledger;
pub mod logs;
pub mod principal;
pub mod profile;
pub mod recover;

use std::path::PathBuf;

use anyhow::{Context, Result};
use wallet_core::config::Config;
use wallet_core::{EntryPoint, LogEvent, LoggingService, Principal, RecoveryReport, WalletContext};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let wallet_dir = get_wallet_dir().ok()?;
    std::fs::create_dir_all(&wallet_dir).ok()?;
    LoggingService::new(&wallet_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the wallet directory from environment or default
pub fn get_wallet_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("WALLET_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".wallet"))
}

/// Load settings.json from the wallet directory
pub fn load_config() -> Result<Config> {
    let wallet_dir = get_wallet_dir()?;
    Config::load(&wallet_dir)
        .with_context(|| format!("Failed to load settings from {}", wallet_dir.display()))
}

/// Open the wallet with its saved settings
pub async fn get_context(logger: &Option<LoggingService>) -> Result<WalletContext> {
    let config = load_config()?;
    open_context(logger, config).await
}

/// Open the wallet with an explicit configuration
pub async fn open_context(logger: &Option<LoggingService>, config: Config) -> Result<WalletContext> {
    let wallet_dir = get_wallet_dir()?;
    let ctx = WalletContext::open_with_config(&wallet_dir, config)
        .await
        .context("Failed to initialize wallet context")?;

    if let Some(report) = &ctx.startup_recovery {
        log_recovery(logger, report);
    }
    Ok(ctx)
}

/// Record a recovery pass that actually resolved something
pub fn log_recovery(logger: &Option<LoggingService>, report: &RecoveryReport) {
    if report.is_empty() {
        return;
    }
    let details = format!(
        "completed={} rolled_back={} partial={} deferred={}",
        report.completed, report.rolled_back, report.partial, report.deferred
    );
    log_event(
        logger,
        LogEvent::new("recovery_completed")
            .with_operation("recover")
            .with_error_details(details),
    );
}

/// Resolve the caller's credential to a principal
///
/// A missing token is passed through so the resolver reports it as
/// unauthorized.
pub async fn authenticate(ctx: &WalletContext, token: Option<&str>) -> Result<Principal> {
    Ok(ctx.authenticate(token.unwrap_or_default()).await?)
}
