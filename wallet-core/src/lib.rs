//! Wallet Core - balance ledger with optimistic concurrency
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Account, Transaction, MutationIntent)
//! - **ports**: Trait definitions for external dependencies (stores, identity)
//! - **services**: Business logic orchestration (ledger, recovery, history)
//! - **adapters**: Concrete implementations (DuckDB, in-memory, static identity)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbStore;
use adapters::identity::StaticIdentityResolver;
use config::Config;
use ports::IdentityResolver;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{Account, IntentState, MutationIntent, Principal, Transaction, TransactionType};
pub use services::{
    BalanceChange, EntryPoint, LogEvent, LoggingService, RecoveryReport, TransactionView,
    TransferResult,
};

/// Database file inside the wallet directory
pub const DB_FILENAME: &str = "wallet.duckdb";

/// Main context for wallet operations
///
/// Holds the store, the configuration and every service wired to it.
pub struct WalletContext {
    pub config: Config,
    pub wallet_dir: PathBuf,
    pub store: Arc<DuckDbStore>,
    pub ledger: LedgerEngine,
    pub history: HistoryService,
    pub profile: ProfileService,
    pub recovery: RecoveryService,
    identity: Arc<dyn IdentityResolver>,
    /// Outcome of the recovery pass run while opening, if any
    pub startup_recovery: Option<RecoveryReport>,
}

impl WalletContext {
    /// Open the wallet in `wallet_dir` using its settings.json
    pub async fn open(wallet_dir: &Path) -> Result<Self> {
        let config = Config::load(wallet_dir)?;
        Self::open_with_config(wallet_dir, config).await
    }

    /// Open the wallet with an explicit configuration
    ///
    /// Runs pending migrations, then resolves interrupted mutations when
    /// `ledger.recover_on_startup` is set.
    pub async fn open_with_config(wallet_dir: &Path, config: Config) -> Result<Self> {
        std::fs::create_dir_all(wallet_dir).with_context(|| {
            format!("Failed to create wallet directory: {}", wallet_dir.display())
        })?;

        let db_path = wallet_dir.join(DB_FILENAME);
        let store = tokio::task::spawn_blocking(move || -> Result<DuckDbStore> {
            let store = DuckDbStore::new(&db_path)?;
            store.ensure_schema()?;
            Ok(store)
        })
        .await
        .context("Database open task failed")??;
        let store = Arc::new(store);

        let identity: Arc<dyn IdentityResolver> =
            Arc::new(StaticIdentityResolver::new(config.principals.clone()));

        let ledger = LedgerEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            config.ledger,
        );
        let history = HistoryService::new(store.clone(), store.clone());
        let profile = ProfileService::new(store.clone());
        let recovery = RecoveryService::new(store.clone(), store.clone(), store.clone());

        let startup_recovery = if config.ledger.recover_on_startup {
            Some(
                recovery
                    .resolve_pending()
                    .await
                    .context("Startup recovery failed")?,
            )
        } else {
            None
        };

        Ok(Self {
            config,
            wallet_dir: wallet_dir.to_path_buf(),
            store,
            ledger,
            history,
            profile,
            recovery,
            identity,
            startup_recovery,
        })
    }

    /// Resolve a credential to a verified principal and make sure the
    /// principal has an account
    ///
    /// A failed account upsert is logged and does not block the caller; the
    /// operation that follows reports the missing account itself.
    pub async fn authenticate(&self, credential: &str) -> domain::result::Result<Principal> {
        let principal = self.identity.resolve(credential).await?;
        if let Err(e) = self.profile.ensure_account(&principal).await {
            tracing::warn!(principal = %principal.id, "account upsert failed: {}", e);
        }
        Ok(principal)
    }

    /// Name of the configured identity resolver
    pub fn identity_name(&self) -> &str {
        self.identity.name()
    }
}
