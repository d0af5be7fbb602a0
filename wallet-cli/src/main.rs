//! Wallet CLI - balance ledger in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{history, ledger, log_event, logs, principal, profile, recover};
use wallet_core::{LogEvent, LoggingService, OperationResult, TransactionType};

/// wl - deposit, withdraw and transfer against a local wallet
#[derive(Parser)]
#[command(name = "wl", version, about, long_about = None)]
struct Cli {
    /// Credential identifying the caller (raw token or "Bearer <token>")
    #[arg(long, global = true, env = "WALLET_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Credit your account
    Deposit {
        /// Amount to deposit (up to 4 decimal places)
        #[arg(allow_hyphen_values = true)]
        amount: Decimal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Debit your account
    Withdraw {
        /// Amount to withdraw (up to 4 decimal places)
        #[arg(allow_hyphen_values = true)]
        amount: Decimal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move funds to another account
    Transfer {
        /// Amount to transfer (up to 4 decimal places)
        #[arg(allow_hyphen_values = true)]
        amount: Decimal,
        /// Recipient email
        #[arg(long)]
        to: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show your account
    Profile {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show your transaction history, newest first
    History {
        /// Only show one kind (deposit, withdraw, transfer)
        #[arg(long = "type")]
        kind: Option<TransactionType>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve mutations interrupted by a crash
    Recover {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the token -> principal map
    Principal {
        #[command(subcommand)]
        command: principal::PrincipalCommands,
    },

    /// View and manage application logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    /// Stable name recorded in the event log
    fn name(&self) -> &'static str {
        match self {
            Commands::Deposit { .. } => "deposit",
            Commands::Withdraw { .. } => "withdraw",
            Commands::Transfer { .. } => "transfer",
            Commands::Profile { .. } => "profile",
            Commands::History { .. } => "history",
            Commands::Recover { .. } => "recover",
            Commands::Principal { .. } => "principal",
            Commands::Logs { .. } => "logs",
        }
    }

    /// Ledger operation the command performs, if any
    fn operation(&self) -> Option<&'static str> {
        match self {
            Commands::Deposit { .. } => Some("deposit"),
            Commands::Withdraw { .. } => Some("withdraw"),
            Commands::Transfer { .. } => Some("transfer"),
            Commands::Recover { .. } => Some("recover"),
            _ => None,
        }
    }

    fn json(&self) -> bool {
        match self {
            Commands::Deposit { json, .. }
            | Commands::Withdraw { json, .. }
            | Commands::Transfer { json, .. }
            | Commands::Profile { json }
            | Commands::History { json, .. }
            | Commands::Recover { json } => *json,
            Commands::Principal { command } => command.json(),
            Commands::Logs { command } => command.json(),
        }
    }
}

/// Diagnostics go to stderr so JSON on stdout stays parseable
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let logger = commands::get_logger();
    let name = cli.command.name();
    let operation = cli.command.operation();
    let json = cli.command.json();

    let result = run(cli, &logger).await;

    match result {
        Ok(()) => {
            let mut event = LogEvent::new("command_executed").with_command(name);
            if let Some(op) = operation {
                event = event.with_operation(op);
            }
            log_event(&logger, event);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&logger, name, operation, json, &e);
            ExitCode::FAILURE
        }
    }
}

fn report_failure(
    logger: &Option<LoggingService>,
    name: &str,
    operation: Option<&str>,
    json: bool,
    e: &anyhow::Error,
) {
    let core = e.downcast_ref::<wallet_core::Error>();

    let mut event = LogEvent::new("command_failed").with_command(name);
    if let Some(op) = operation {
        event = event.with_operation(op);
    }
    event = match core {
        Some(err) => event.with_core_error(err),
        None => event.with_error(e.to_string()),
    };
    log_event(logger, event);

    if json {
        let result: OperationResult<()> = match core {
            Some(err) => OperationResult::from_error(err),
            None => OperationResult::fail(format!("{:#}", e)),
        };
        if let Ok(text) = serde_json::to_string_pretty(&result) {
            println!("{}", text);
        }
        return;
    }

    match core {
        Some(err) => output::error(&format!("[{}] {}", err.class(), err)),
        None => output::error(&format!("[internal] {:#}", e)),
    }
}

async fn run(cli: Cli, logger: &Option<LoggingService>) -> Result<()> {
    let token = cli.token.as_deref();
    match cli.command {
        Commands::Deposit { amount, json } => {
            ledger::run_single(logger, token, amount, TransactionType::Deposit, json).await
        }
        Commands::Withdraw { amount, json } => {
            ledger::run_single(logger, token, amount, TransactionType::Withdraw, json).await
        }
        Commands::Transfer { amount, to, json } => {
            ledger::run_transfer(logger, token, amount, &to, json).await
        }
        Commands::Profile { json } => profile::run(logger, token, json).await,
        Commands::History { kind, json } => history::run(logger, token, kind, json).await,
        Commands::Recover { json } => recover::run(logger, json).await,
        Commands::Principal { command } => principal::run(command),
        Commands::Logs { command } => logs::run(command),
    }
}
