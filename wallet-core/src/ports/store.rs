//! Store ports - persistence abstractions used by the ledger services

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Account, IntentState, MutationIntent, Principal, Transaction};

/// Account persistence
///
/// `conditional_update_balance` is the only concurrency primitive the ledger
/// relies on. Implementations must apply it as one indivisible
/// compare-and-set on the account's version.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Point read by email
    ///
    /// Returns `Error::NotFound` if no account carries this email.
    async fn get(&self, email: &str) -> Result<Account>;

    /// Point read by id
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    /// Insert the account if the id is new, otherwise refresh email and names.
    /// Balance and version are never touched.
    async fn upsert_profile(&self, principal: &Principal) -> Result<Account>;

    /// Write `new_balance` only if the stored version still equals
    /// `expected_version`
    ///
    /// Returns `Error::Conflict` and leaves the row untouched otherwise.
    async fn conditional_update_balance(
        &self,
        id: Uuid,
        expected_version: u64,
        new_balance: Decimal,
    ) -> Result<Account>;

    /// Write `new_balance` unconditionally. Still bumps the version.
    async fn force_update_balance(&self, id: Uuid, new_balance: Decimal) -> Result<Account>;
}

/// Append-only transaction log
#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// Insert a record. A duplicate id is a store error.
    async fn append(&self, record: &Transaction) -> Result<Transaction>;

    /// Point read by id
    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>>;

    /// Records where the account is sender or recipient, newest first
    async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>>;
}

/// Durable mutation intents
#[async_trait]
pub trait IntentLog: Send + Sync {
    /// Persist a new intent before its first leg runs
    async fn record(&self, intent: &MutationIntent) -> Result<()>;

    /// Move an intent to a new state
    async fn update_state(&self, id: Uuid, state: IntentState) -> Result<()>;

    /// Point read by id
    async fn get_intent(&self, id: Uuid) -> Result<Option<MutationIntent>>;

    /// Every intent not in a terminal state, oldest first
    async fn pending(&self) -> Result<Vec<MutationIntent>>;
}
