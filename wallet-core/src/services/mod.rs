//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod history;
mod ledger;
pub mod logging;
pub mod migration;
mod profile;
mod recovery;

pub use history::{HistoryService, TransactionView};
pub use ledger::{BalanceChange, LedgerEngine, TransferResult, MAX_AMOUNT, MAX_AMOUNT_SCALE};
pub use logging::{EntryPoint, LogEntry, LogEvent, LogStats, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use profile::ProfileService;
pub use recovery::{RecoveryReport, RecoveryService};
