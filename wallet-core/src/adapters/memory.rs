//! In-memory store implementing every store port
//!
//! Intended for tests and throwaway sessions. All state sits behind one
//! `RwLock`, so each port call is atomic with respect to the others.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, IntentState, MutationIntent, Principal, Transaction};
use crate::ports::{AccountStore, IntentLog, TransactionLog};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    /// Append order; position doubles as the insertion sequence
    transactions: Vec<Transaction>,
    intents: Vec<MutationIntent>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::database("memory store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::database("memory store lock poisoned"))
    }

    /// Number of records in the transaction log
    pub fn transaction_count(&self) -> Result<usize> {
        Ok(self.read()?.transactions.len())
    }

    /// Every intent ever recorded, in insertion order
    pub fn intents(&self) -> Result<Vec<MutationIntent>> {
        Ok(self.read()?.intents.clone())
    }
}

fn apply_balance(account: &mut Account, new_balance: Decimal) -> Result<Account> {
    if new_balance < Decimal::ZERO {
        return Err(Error::database(format!(
            "balance for account {} would become negative",
            account.id
        )));
    }
    account.balance = new_balance;
    account.version += 1;
    account.updated_at = Utc::now();
    Ok(account.clone())
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get(&self, email: &str) -> Result<Account> {
        self.read()?
            .accounts
            .values()
            .find(|a| a.email == email)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("account {}", email)))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    async fn upsert_profile(&self, principal: &Principal) -> Result<Account> {
        let mut state = self.write()?;

        let email_taken = state
            .accounts
            .values()
            .any(|a| a.email == principal.email && a.id != principal.id);
        if email_taken {
            return Err(Error::database(format!(
                "email {} already belongs to another account",
                principal.email
            )));
        }

        let account = state
            .accounts
            .entry(principal.id)
            .and_modify(|a| {
                a.email = principal.email.clone();
                a.first_name = principal.first_name.clone();
                a.last_name = principal.last_name.clone();
                a.updated_at = Utc::now();
            })
            .or_insert_with(|| Account::new(principal));
        Ok(account.clone())
    }

    async fn conditional_update_balance(
        &self,
        id: Uuid,
        expected_version: u64,
        new_balance: Decimal,
    ) -> Result<Account> {
        let mut state = self.write()?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("account {}", id)))?;

        if account.version != expected_version {
            return Err(Error::conflict(format!(
                "account {} changed: expected version {}, found {}",
                id, expected_version, account.version
            )));
        }
        apply_balance(account, new_balance)
    }

    async fn force_update_balance(&self, id: Uuid, new_balance: Decimal) -> Result<Account> {
        let mut state = self.write()?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("account {}", id)))?;
        apply_balance(account, new_balance)
    }
}

#[async_trait]
impl TransactionLog for MemoryStore {
    async fn append(&self, record: &Transaction) -> Result<Transaction> {
        record.validate().map_err(Error::validation)?;
        let mut state = self.write()?;
        if state.transactions.iter().any(|t| t.id == record.id) {
            return Err(Error::database(format!("duplicate transaction id {}", record.id)));
        }
        state.transactions.push(record.clone());
        Ok(record.clone())
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.read()?.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        let state = self.read()?;
        // Reverse insertion order first so equal timestamps stay newest-first
        // through the stable sort.
        let mut rows: Vec<Transaction> = state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.touches(account_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl IntentLog for MemoryStore {
    async fn record(&self, intent: &MutationIntent) -> Result<()> {
        let mut state = self.write()?;
        if state.intents.iter().any(|i| i.id == intent.id) {
            return Err(Error::database(format!("duplicate intent id {}", intent.id)));
        }
        state.intents.push(intent.clone());
        Ok(())
    }

    async fn update_state(&self, id: Uuid, new_state: IntentState) -> Result<()> {
        let mut state = self.write()?;
        let intent = state
            .intents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::not_found(format!("intent {}", id)))?;
        intent.state = new_state;
        intent.updated_at = Utc::now();
        Ok(())
    }

    async fn get_intent(&self, id: Uuid) -> Result<Option<MutationIntent>> {
        Ok(self.read()?.intents.iter().find(|i| i.id == id).cloned())
    }

    async fn pending(&self) -> Result<Vec<MutationIntent>> {
        Ok(self
            .read()?
            .intents
            .iter()
            .filter(|i| !i.state.is_terminal())
            .cloned()
            .collect())
    }
}
