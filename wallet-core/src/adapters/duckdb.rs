//! DuckDB store implementation
//!
//! One connection behind a mutex. Every port call runs on the blocking pool
//! and holds the lock for its whole read-modify-write, so the conditional
//! balance update is a single guarded `UPDATE` no other caller can
//! interleave with.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection, OptionalExt};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, IntentState, LegIntent, MutationIntent, Principal, Transaction, TransactionType,
};
use crate::ports::{AccountStore, IntentLog, TransactionLog};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const ACCOUNT_COLUMNS: &str = "account_id, email, balance::VARCHAR, first_name, last_name, version,
                               created_at::VARCHAR, updated_at::VARCHAR";

const TRANSACTION_COLUMNS: &str =
    "transaction_id, amount::VARCHAR, transaction_type, sender_id, recipient_id, created_at::VARCHAR";

const INTENT_COLUMNS: &str = "intent_id, transaction_id, transaction_type, amount::VARCHAR,
                              sender_id, sender_balance_before::VARCHAR, sender_balance_after::VARCHAR,
                              sender_version_before,
                              recipient_id, recipient_balance_before::VARCHAR,
                              recipient_balance_after::VARCHAR, recipient_version_before,
                              state, created_at::VARCHAR, updated_at::VARCHAR";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB implementation of every store port
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl DuckDbStore {
    /// Open (or create) the database file
    ///
    /// Retries with exponential backoff on file locking errors, which show up
    /// when another process is holding the file open.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Arc::new(Mutex::new(conn)),
                        db_path: db_path.to_path_buf(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            delay_ms = delay.as_millis() as u64,
                            "database busy, retrying: {}",
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Disable extension autoloading; nothing here needs extensions and
        // cached ones can fail code signing checks on macOS.
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> anyhow::Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` against the connection on the blocking pool
    ///
    /// The spawned task runs to completion even if the caller's future is
    /// dropped, so a started write is never abandoned halfway.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await
        .map_err(|e| Error::internal(format!("store task failed: {}", e)))?
    }
}

// === Row helpers ===

fn select_account_by_id(conn: &Connection, id: &str) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM sys_accounts WHERE account_id = ?", ACCOUNT_COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], row_to_account)
        .optional()?)
}

fn row_to_account(row: &duckdb::Row) -> duckdb::Result<Account> {
    Ok(Account {
        id: uuid_at(row, 0)?,
        email: row.get(1)?,
        balance: decimal_at(row, 2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        version: version_at(row, 5)?,
        created_at: timestamp_at(row, 6)?,
        updated_at: timestamp_at(row, 7)?,
    })
}

fn row_to_transaction(row: &duckdb::Row) -> duckdb::Result<Transaction> {
    Ok(Transaction {
        id: uuid_at(row, 0)?,
        amount: decimal_at(row, 1)?,
        transaction_type: type_at(row, 2)?,
        sender_id: uuid_at(row, 3)?,
        recipient_id: uuid_at(row, 4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

fn row_to_intent(row: &duckdb::Row) -> duckdb::Result<MutationIntent> {
    let sender = LegIntent {
        account_id: uuid_at(row, 4)?,
        balance_before: decimal_at(row, 5)?,
        balance_after: decimal_at(row, 6)?,
        version_before: version_at(row, 7)?,
    };

    let recipient_id: Option<String> = row.get(8)?;
    let recipient = match recipient_id {
        Some(_) => Some(LegIntent {
            account_id: uuid_at(row, 8)?,
            balance_before: decimal_at(row, 9)?,
            balance_after: decimal_at(row, 10)?,
            version_before: version_at(row, 11)?,
        }),
        None => None,
    };

    let state_str: String = row.get(12)?;

    Ok(MutationIntent {
        id: uuid_at(row, 0)?,
        transaction_id: uuid_at(row, 1)?,
        transaction_type: type_at(row, 2)?,
        amount: decimal_at(row, 3)?,
        sender,
        recipient,
        // Unreadable state is treated as the earliest one so recovery still
        // inspects the accounts instead of skipping the intent.
        state: state_str.parse().unwrap_or(IntentState::Started),
        created_at: timestamp_at(row, 13)?,
        updated_at: timestamp_at(row, 14)?,
    })
}

/// Update one balance, optionally guarded by the version, and read it back
fn write_balance(
    conn: &Connection,
    id: Uuid,
    expected_version: Option<u64>,
    new_balance: Decimal,
) -> Result<Account> {
    let id_str = id.to_string();
    let now = format_timestamp(&Utc::now());

    let changed = match expected_version {
        Some(version) => conn.execute(
            "UPDATE sys_accounts
             SET balance = CAST(? AS DECIMAL(18, 4)), version = version + 1, updated_at = ?
             WHERE account_id = ? AND version = ?",
            params![new_balance.to_string(), now, id_str, version as i64],
        )?,
        None => conn.execute(
            "UPDATE sys_accounts
             SET balance = CAST(? AS DECIMAL(18, 4)), version = version + 1, updated_at = ?
             WHERE account_id = ?",
            params![new_balance.to_string(), now, id_str],
        )?,
    };

    let current = select_account_by_id(conn, &id_str)?
        .ok_or_else(|| Error::not_found(format!("account {}", id)))?;

    if changed == 0 {
        return Err(Error::conflict(format!(
            "account {} changed: expected version {}, found {}",
            id,
            expected_version.unwrap_or_default(),
            current.version
        )));
    }
    Ok(current)
}

// === AccountStore ===

#[async_trait]
impl AccountStore for DuckDbStore {
    async fn get(&self, email: &str) -> Result<Account> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM sys_accounts WHERE email = ?", ACCOUNT_COLUMNS);
            conn.query_row(&sql, params![email], row_to_account)
                .optional()?
                .ok_or_else(|| Error::not_found(format!("account {}", email)))
        })
        .await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        self.with_conn(move |conn| select_account_by_id(conn, &id.to_string()))
            .await
    }

    async fn upsert_profile(&self, principal: &Principal) -> Result<Account> {
        let principal = principal.clone();
        self.with_conn(move |conn| {
            let id_str = principal.id.to_string();

            let owner: Option<String> = conn
                .query_row(
                    "SELECT account_id FROM sys_accounts WHERE email = ? AND account_id <> ?",
                    params![principal.email, id_str],
                    |row| row.get(0),
                )
                .optional()?;
            if owner.is_some() {
                return Err(Error::database(format!(
                    "email {} already belongs to another account",
                    principal.email
                )));
            }

            let now = format_timestamp(&Utc::now());
            conn.execute(
                "INSERT INTO sys_accounts (account_id, email, balance, first_name, last_name,
                                           version, created_at, updated_at)
                 VALUES (?, ?, 0, ?, ?, 0, ?, ?)
                 ON CONFLICT (account_id) DO UPDATE SET
                    email = EXCLUDED.email,
                    first_name = EXCLUDED.first_name,
                    last_name = EXCLUDED.last_name,
                    updated_at = EXCLUDED.updated_at",
                params![
                    id_str,
                    principal.email,
                    principal.first_name,
                    principal.last_name,
                    now,
                    now,
                ],
            )?;

            select_account_by_id(conn, &id_str)?
                .ok_or_else(|| Error::database(format!("account {} vanished after upsert", id_str)))
        })
        .await
    }

    async fn conditional_update_balance(
        &self,
        id: Uuid,
        expected_version: u64,
        new_balance: Decimal,
    ) -> Result<Account> {
        self.with_conn(move |conn| write_balance(conn, id, Some(expected_version), new_balance))
            .await
    }

    async fn force_update_balance(&self, id: Uuid, new_balance: Decimal) -> Result<Account> {
        self.with_conn(move |conn| write_balance(conn, id, None, new_balance))
            .await
    }
}

// === TransactionLog ===

#[async_trait]
impl TransactionLog for DuckDbStore {
    async fn append(&self, record: &Transaction) -> Result<Transaction> {
        record.validate().map_err(Error::validation)?;
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sys_transactions (transaction_id, amount, transaction_type,
                                               sender_id, recipient_id, created_at)
                 VALUES (?, CAST(? AS DECIMAL(18, 4)), ?, ?, ?, ?)",
                params![
                    record.id.to_string(),
                    record.amount.to_string(),
                    record.transaction_type.as_str(),
                    record.sender_id.to_string(),
                    record.recipient_id.to_string(),
                    format_timestamp(&record.created_at),
                ],
            )?;
            Ok(record)
        })
        .await
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM sys_transactions WHERE transaction_id = ?",
                TRANSACTION_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![id.to_string()], row_to_transaction)
                .optional()?)
        })
        .await
    }

    async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM sys_transactions
                 WHERE sender_id = ? OR recipient_id = ?
                 ORDER BY created_at DESC, seq DESC",
                TRANSACTION_COLUMNS
            );
            let id_str = account_id.to_string();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![id_str, id_str], row_to_transaction)?
                .collect::<duckdb::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}

// === IntentLog ===

#[async_trait]
impl IntentLog for DuckDbStore {
    async fn record(&self, intent: &MutationIntent) -> Result<()> {
        let intent = intent.clone();
        self.with_conn(move |conn| {
            let recipient = intent.recipient.as_ref();
            conn.execute(
                "INSERT INTO sys_mutation_intents (
                    intent_id, transaction_id, transaction_type, amount,
                    sender_id, sender_balance_before, sender_balance_after, sender_version_before,
                    recipient_id, recipient_balance_before, recipient_balance_after,
                    recipient_version_before, state, created_at, updated_at)
                 VALUES (?, ?, ?, CAST(? AS DECIMAL(18, 4)),
                         ?, CAST(? AS DECIMAL(18, 4)), CAST(? AS DECIMAL(18, 4)), ?,
                         ?, CAST(? AS DECIMAL(18, 4)), CAST(? AS DECIMAL(18, 4)),
                         ?, ?, ?, ?)",
                params![
                    intent.id.to_string(),
                    intent.transaction_id.to_string(),
                    intent.transaction_type.as_str(),
                    intent.amount.to_string(),
                    intent.sender.account_id.to_string(),
                    intent.sender.balance_before.to_string(),
                    intent.sender.balance_after.to_string(),
                    intent.sender.version_before as i64,
                    recipient.map(|r| r.account_id.to_string()),
                    recipient.map(|r| r.balance_before.to_string()),
                    recipient.map(|r| r.balance_after.to_string()),
                    recipient.map(|r| r.version_before as i64),
                    intent.state.as_str(),
                    format_timestamp(&intent.created_at),
                    format_timestamp(&intent.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_state(&self, id: Uuid, state: IntentState) -> Result<()> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE sys_mutation_intents SET state = ?, updated_at = ? WHERE intent_id = ?",
                params![state.as_str(), format_timestamp(&Utc::now()), id.to_string()],
            )?;
            if changed == 0 {
                return Err(Error::not_found(format!("intent {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn get_intent(&self, id: Uuid) -> Result<Option<MutationIntent>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM sys_mutation_intents WHERE intent_id = ?",
                INTENT_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![id.to_string()], row_to_intent)
                .optional()?)
        })
        .await
    }

    async fn pending(&self) -> Result<Vec<MutationIntent>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM sys_mutation_intents
                 WHERE state NOT IN ('logged', 'compensated_failure', 'compensated_partial')
                 ORDER BY created_at ASC",
                INTENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], row_to_intent)?
                .collect::<duckdb::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}

// Helper functions

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
}

fn parse_decimal(s: &str) -> std::result::Result<Decimal, rust_decimal::Error> {
    Decimal::from_str_exact(s.trim()).map(|d| d.normalize())
}

// A column that does not parse fails the whole row; a default value would
// become the starting point of the next balance write.

fn conversion_error<E>(idx: usize, err: E) -> duckdb::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    duckdb::Error::FromSqlConversionFailure(idx, duckdb::types::Type::Text, err.into())
}

fn decimal_at(row: &duckdb::Row, idx: usize) -> duckdb::Result<Decimal> {
    let raw: String = row.get(idx)?;
    parse_decimal(&raw).map_err(|e| conversion_error(idx, e))
}

fn uuid_at(row: &duckdb::Row, idx: usize) -> duckdb::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn type_at(row: &duckdb::Row, idx: usize) -> duckdb::Result<TransactionType> {
    let raw: String = row.get(idx)?;
    raw.parse::<TransactionType>()
        .map_err(|e| conversion_error(idx, e))
}

fn timestamp_at(row: &duckdb::Row, idx: usize) -> duckdb::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(|e| conversion_error(idx, e))
}

fn version_at(row: &duckdb::Row, idx: usize) -> duckdb::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|e| conversion_error(idx, e))
}
