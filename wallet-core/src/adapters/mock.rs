//! Recording and faulting store wrapper for testing
//!
//! Wraps a `MemoryStore`, counts every port call by method name and can be
//! told to fail specific calls so the engine's failure paths can be driven
//! without a real storage fault.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Barrier;
use uuid::Uuid;

use super::memory::MemoryStore;
use crate::domain::result::{Error, Result};
use crate::domain::{Account, IntentState, MutationIntent, Principal, Transaction};
use crate::ports::{AccountStore, IntentLog, TransactionLog};

/// Failure knobs, all off by default
#[derive(Debug, Default)]
pub struct Faults {
    pub fail_append: AtomicBool,
    pub fail_record_intent: AtomicBool,
    pub fail_intent_updates: AtomicBool,
    /// Fail only the state writes moving an intent into one of these states
    pub fail_intent_states: Mutex<Vec<IntentState>>,
    /// Fail every forced write, or only those to one account
    pub fail_force_update: AtomicBool,
    pub fail_force_update_for: Mutex<Option<Uuid>>,
    /// Before the next conditional update on this account, move its balance
    /// away and back so only the version differs from what the caller saw
    pub aba_before_conditional: Mutex<Option<Uuid>>,
    /// Every `get` waits here after reading, so concurrent callers all
    /// observe the same state before any of them writes
    pub barrier_after_get: Mutex<Option<Arc<Barrier>>>,
}

#[derive(Debug, Default)]
pub struct MockStore {
    pub inner: MemoryStore,
    pub faults: Faults,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, method: &'static str) {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(method).or_default() += 1;
        }
    }

    /// Number of calls made to one port method
    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.get(method).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of calls across every port method
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|c| c.values().sum())
            .unwrap_or_default()
    }

    /// Seed an account with a balance, bypassing call tracking
    pub async fn seed(&self, email: &str, balance: Decimal) -> Account {
        let account = self
            .inner
            .upsert_profile(&Principal::new(Uuid::new_v4(), email))
            .await
            .expect("seed upsert");
        self.inner
            .force_update_balance(account.id, balance)
            .await
            .expect("seed balance")
    }

    fn force_update_blocked(&self, id: Uuid) -> bool {
        if self.faults.fail_force_update.load(Ordering::SeqCst) {
            return true;
        }
        self.faults
            .fail_force_update_for
            .lock()
            .map(|target| *target == Some(id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl AccountStore for MockStore {
    async fn get(&self, email: &str) -> Result<Account> {
        self.track("get");
        let account = self.inner.get(email).await?;
        let barrier = self
            .faults
            .barrier_after_get
            .lock()
            .ok()
            .and_then(|b| b.clone());
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        Ok(account)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        self.track("get_by_id");
        self.inner.get_by_id(id).await
    }

    async fn upsert_profile(&self, principal: &Principal) -> Result<Account> {
        self.track("upsert_profile");
        self.inner.upsert_profile(principal).await
    }

    async fn conditional_update_balance(
        &self,
        id: Uuid,
        expected_version: u64,
        new_balance: Decimal,
    ) -> Result<Account> {
        self.track("conditional_update_balance");
        let aba = self
            .faults
            .aba_before_conditional
            .lock()
            .map(|mut target| {
                if *target == Some(id) {
                    target.take().is_some()
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if aba {
            if let Some(current) = self.inner.get_by_id(id).await? {
                self.inner
                    .force_update_balance(id, current.balance + Decimal::ONE)
                    .await?;
                self.inner.force_update_balance(id, current.balance).await?;
            }
        }
        self.inner
            .conditional_update_balance(id, expected_version, new_balance)
            .await
    }

    async fn force_update_balance(&self, id: Uuid, new_balance: Decimal) -> Result<Account> {
        self.track("force_update_balance");
        if self.force_update_blocked(id) {
            return Err(Error::database("injected force update failure"));
        }
        self.inner.force_update_balance(id, new_balance).await
    }
}

#[async_trait]
impl TransactionLog for MockStore {
    async fn append(&self, record: &Transaction) -> Result<Transaction> {
        self.track("append");
        if self.faults.fail_append.load(Ordering::SeqCst) {
            return Err(Error::database("injected append failure"));
        }
        self.inner.append(record).await
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.track("get_transaction");
        self.inner.get_transaction(id).await
    }

    async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        self.track("list_for_account");
        self.inner.list_for_account(account_id).await
    }
}

#[async_trait]
impl IntentLog for MockStore {
    async fn record(&self, intent: &MutationIntent) -> Result<()> {
        self.track("record");
        if self.faults.fail_record_intent.load(Ordering::SeqCst) {
            return Err(Error::database("injected intent record failure"));
        }
        self.inner.record(intent).await
    }

    async fn update_state(&self, id: Uuid, state: IntentState) -> Result<()> {
        self.track("update_state");
        let blocked = self.faults.fail_intent_updates.load(Ordering::SeqCst)
            || self
                .faults
                .fail_intent_states
                .lock()
                .map(|states| states.contains(&state))
                .unwrap_or(false);
        if blocked {
            return Err(Error::database("injected intent update failure"));
        }
        self.inner.update_state(id, state).await
    }

    async fn get_intent(&self, id: Uuid) -> Result<Option<MutationIntent>> {
        self.track("get_intent");
        self.inner.get_intent(id).await
    }

    async fn pending(&self) -> Result<Vec<MutationIntent>> {
        self.track("pending");
        self.inner.pending().await
    }
}
