//! Recovery service - resolves mutations interrupted mid-flight
//!
//! Any intent left in a non-terminal state was cut off between legs. Each one
//! is either completed forward (every leg landed, only the log record is
//! missing) or rolled back leg by leg. A leg is only restored when the
//! account's version proves nothing else has written it since.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::{IntentState, LegIntent, MutationIntent, Transaction};
use crate::ports::{AccountStore, IntentLog, TransactionLog};

/// Result of a recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Intents marked logged, with the record appended if it was missing
    pub completed: usize,
    /// Intents whose legs were all restored or never applied
    pub rolled_back: usize,
    /// Intents with at least one leg that could not be restored safely
    pub partial: usize,
    /// Intents left pending because a store call failed; retried next pass
    pub deferred: usize,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.completed + self.rolled_back + self.partial + self.deferred
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Completed,
    RolledBack,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegOutcome {
    NeverApplied,
    Restored,
    AlreadyRestored,
    Unrecoverable,
}

impl LegOutcome {
    fn is_clean(self) -> bool {
        self != LegOutcome::Unrecoverable
    }
}

pub struct RecoveryService {
    accounts: Arc<dyn AccountStore>,
    log: Arc<dyn TransactionLog>,
    intents: Arc<dyn IntentLog>,
}

impl RecoveryService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        log: Arc<dyn TransactionLog>,
        intents: Arc<dyn IntentLog>,
    ) -> Self {
        Self {
            accounts,
            log,
            intents,
        }
    }

    /// Resolve every non-terminal intent, oldest first
    pub async fn resolve_pending(&self) -> Result<RecoveryReport> {
        let pending = self.intents.pending().await?;
        let mut report = RecoveryReport::default();

        for intent in &pending {
            match self.resolve(intent).await {
                Ok(Resolution::Completed) => report.completed += 1,
                Ok(Resolution::RolledBack) => report.rolled_back += 1,
                Ok(Resolution::Partial) => report.partial += 1,
                Err(e) => {
                    tracing::error!(intent = %intent.id, "recovery deferred: {}", e);
                    report.deferred += 1;
                }
            }
        }

        if !report.is_empty() {
            tracing::info!(
                completed = report.completed,
                rolled_back = report.rolled_back,
                partial = report.partial,
                deferred = report.deferred,
                "recovery pass finished"
            );
        }
        Ok(report)
    }

    async fn resolve(&self, intent: &MutationIntent) -> Result<Resolution> {
        if self
            .log
            .get_transaction(intent.transaction_id)
            .await?
            .is_some()
        {
            tracing::info!(intent = %intent.id, "transaction already logged, closing intent");
            self.intents
                .update_state(intent.id, IntentState::Logged)
                .await?;
            return Ok(Resolution::Completed);
        }

        if intent.all_legs_applied() && self.legs_still_applied(intent).await? {
            let recipient_id = intent
                .recipient
                .as_ref()
                .map(|leg| leg.account_id)
                .unwrap_or(intent.sender.account_id);
            let record = Transaction::new(
                intent.transaction_id,
                intent.transaction_type,
                intent.amount,
                intent.sender.account_id,
                recipient_id,
            );
            self.log.append(&record).await?;
            tracing::info!(
                intent = %intent.id,
                transaction = %record.id,
                "completed interrupted {}",
                record.transaction_type
            );
            self.intents
                .update_state(intent.id, IntentState::Logged)
                .await?;
            return Ok(Resolution::Completed);
        }

        let mut clean = true;
        for leg in intent.legs() {
            let outcome = self.roll_back_leg(intent, leg).await?;
            clean &= outcome.is_clean();
        }

        let (state, resolution) = if clean {
            (IntentState::CompensatedFailure, Resolution::RolledBack)
        } else {
            (IntentState::CompensatedPartial, Resolution::Partial)
        };
        self.intents.update_state(intent.id, state).await?;
        Ok(resolution)
    }

    /// Every leg's account still holds exactly the write this intent made
    ///
    /// A compensation whose state writes were lost leaves the intent looking
    /// fully applied while the balances are already back.
    async fn legs_still_applied(&self, intent: &MutationIntent) -> Result<bool> {
        for leg in intent.legs() {
            let applied = self
                .accounts
                .get_by_id(leg.account_id)
                .await?
                .is_some_and(|a| {
                    a.version == leg.version_before + 1 && a.balance == leg.balance_after
                });
            if !applied {
                tracing::warn!(
                    intent = %intent.id,
                    account = %leg.account_id,
                    "leg no longer matches the intent, rolling back instead of completing"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn roll_back_leg(&self, intent: &MutationIntent, leg: &LegIntent) -> Result<LegOutcome> {
        let Some(account) = self.accounts.get_by_id(leg.account_id).await? else {
            tracing::error!(
                intent = %intent.id,
                account = %leg.account_id,
                "account missing, cannot roll back"
            );
            return Ok(LegOutcome::Unrecoverable);
        };

        let outcome = if account.version == leg.version_before {
            LegOutcome::NeverApplied
        } else if account.version == leg.version_before + 1 && account.balance == leg.balance_after {
            self.accounts
                .force_update_balance(leg.account_id, leg.balance_before)
                .await?;
            tracing::info!(intent = %intent.id, account = %leg.account_id, "restored balance");
            LegOutcome::Restored
        } else if account.version == leg.version_before + 2 && account.balance == leg.balance_before {
            LegOutcome::AlreadyRestored
        } else {
            tracing::error!(
                intent = %intent.id,
                account = %leg.account_id,
                version_before = leg.version_before,
                version_now = account.version,
                "account written since the interrupted mutation, leaving as is"
            );
            LegOutcome::Unrecoverable
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::{Account, Principal, TransactionType};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn service(store: &Arc<MemoryStore>) -> RecoveryService {
        RecoveryService::new(store.clone(), store.clone(), store.clone())
    }

    async fn seed(store: &MemoryStore, email: &str, balance: Decimal) -> Account {
        let account = store
            .upsert_profile(&Principal::new(Uuid::new_v4(), email))
            .await
            .unwrap();
        store.force_update_balance(account.id, balance).await.unwrap()
    }

    /// Record a transfer intent, apply its first `legs` legs and leave it at
    /// `state`, as if the process died right there
    async fn interrupted_transfer(
        store: &MemoryStore,
        amount: Decimal,
        legs: usize,
        state: IntentState,
    ) -> (MutationIntent, Account, Account) {
        let sender = seed(store, "ana@example.com", dec!(100)).await;
        let recipient = seed(store, "bob@example.com", dec!(20)).await;
        let intent = MutationIntent::transfer(
            amount,
            LegIntent::new(&sender, sender.balance - amount),
            LegIntent::new(&recipient, recipient.balance + amount),
        );
        store.record(&intent).await.unwrap();
        for leg in intent.legs().take(legs) {
            store
                .force_update_balance(leg.account_id, leg.balance_after)
                .await
                .unwrap();
        }
        store.update_state(intent.id, state).await.unwrap();
        (intent, sender, recipient)
    }

    async fn state_of(store: &MemoryStore, intent: &MutationIntent) -> IntentState {
        store.get_intent(intent.id).await.unwrap().unwrap().state
    }

    #[tokio::test]
    async fn test_nothing_pending() {
        let store = Arc::new(MemoryStore::new());
        let report = service(&store).resolve_pending().await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_both_legs_applied_completes_forward() {
        let store = Arc::new(MemoryStore::new());
        let (intent, sender, recipient) =
            interrupted_transfer(&store, dec!(50), 2, IntentState::RecipientLegApplied).await;

        let report = service(&store).resolve_pending().await.unwrap();
        assert_eq!(report.completed, 1);

        let record = store
            .get_transaction(intent.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.sender_id, sender.id);
        assert_eq!(record.recipient_id, recipient.id);
        assert_eq!(record.amount, dec!(50));
        assert_eq!(store.get("ana@example.com").await.unwrap().balance, dec!(50));
        assert_eq!(store.get("bob@example.com").await.unwrap().balance, dec!(70));
        assert_eq!(state_of(&store, &intent).await, IntentState::Logged);
    }

    #[tokio::test]
    async fn test_sender_leg_only_rolls_back() {
        let store = Arc::new(MemoryStore::new());
        let (intent, sender, _) =
            interrupted_transfer(&store, dec!(50), 1, IntentState::SenderLegApplied).await;

        let report = service(&store).resolve_pending().await.unwrap();
        assert_eq!(report.rolled_back, 1);

        let ana = store.get("ana@example.com").await.unwrap();
        assert_eq!(ana.balance, dec!(100));
        assert_eq!(ana.version, sender.version + 2);
        assert_eq!(store.get("bob@example.com").await.unwrap().balance, dec!(20));
        assert_eq!(store.transaction_count().unwrap(), 0);
        assert_eq!(state_of(&store, &intent).await, IntentState::CompensatedFailure);
    }

    #[tokio::test]
    async fn test_unrecorded_leg_is_still_rolled_back() {
        // Both legs landed but the state write after the recipient leg was lost
        let store = Arc::new(MemoryStore::new());
        let (intent, _, _) =
            interrupted_transfer(&store, dec!(50), 2, IntentState::SenderLegApplied).await;

        let report = service(&store).resolve_pending().await.unwrap();
        assert_eq!(report.rolled_back, 1);
        assert_eq!(store.get("ana@example.com").await.unwrap().balance, dec!(100));
        assert_eq!(store.get("bob@example.com").await.unwrap().balance, dec!(20));
        assert_eq!(state_of(&store, &intent).await, IntentState::CompensatedFailure);
    }

    #[tokio::test]
    async fn test_compensated_transfer_with_lost_state_is_not_completed() {
        // Append failed and both restores landed, but every state write after
        // recipient_leg_applied was lost
        let store = Arc::new(MemoryStore::new());
        let (intent, sender, recipient) =
            interrupted_transfer(&store, dec!(50), 2, IntentState::RecipientLegApplied).await;
        for leg in intent.legs() {
            store
                .force_update_balance(leg.account_id, leg.balance_before)
                .await
                .unwrap();
        }

        let report = service(&store).resolve_pending().await.unwrap();
        assert_eq!(report.rolled_back, 1);
        assert_eq!(report.completed, 0);
        assert_eq!(store.transaction_count().unwrap(), 0);

        let ana = store.get("ana@example.com").await.unwrap();
        let bob = store.get("bob@example.com").await.unwrap();
        assert_eq!(ana.balance, dec!(100));
        assert_eq!(ana.version, sender.version + 2);
        assert_eq!(bob.balance, dec!(20));
        assert_eq!(bob.version, recipient.version + 2);
        assert_eq!(state_of(&store, &intent).await, IntentState::CompensatedFailure);
    }

    #[tokio::test]
    async fn test_compensated_deposit_with_lost_state_is_not_completed() {
        let store = Arc::new(MemoryStore::new());
        let account = seed(&store, "ana@example.com", dec!(10)).await;
        let intent = MutationIntent::single(
            TransactionType::Deposit,
            dec!(5),
            LegIntent::new(&account, dec!(15)),
        );
        store.record(&intent).await.unwrap();
        store.force_update_balance(account.id, dec!(15)).await.unwrap();
        store
            .update_state(intent.id, IntentState::SenderLegApplied)
            .await
            .unwrap();
        store.force_update_balance(account.id, dec!(10)).await.unwrap();

        let report = service(&store).resolve_pending().await.unwrap();
        assert_eq!(report.rolled_back, 1);
        assert_eq!(store.transaction_count().unwrap(), 0);
        assert_eq!(store.get("ana@example.com").await.unwrap().balance, dec!(10));
    }

    #[tokio::test]
    async fn test_already_logged_is_only_marked() {
        let store = Arc::new(MemoryStore::new());
        let (intent, sender, recipient) =
            interrupted_transfer(&store, dec!(50), 2, IntentState::RecipientLegApplied).await;
        let record = Transaction::new(
            intent.transaction_id,
            TransactionType::Transfer,
            dec!(50),
            sender.id,
            recipient.id,
        );
        store.append(&record).await.unwrap();

        let report = service(&store).resolve_pending().await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(store.transaction_count().unwrap(), 1);
        assert_eq!(state_of(&store, &intent).await, IntentState::Logged);
    }

    #[tokio::test]
    async fn test_already_compensated_legs_are_left_alone() {
        let store = Arc::new(MemoryStore::new());
        let (intent, sender, _) =
            interrupted_transfer(&store, dec!(50), 1, IntentState::Compensating).await;
        store
            .force_update_balance(sender.id, dec!(100))
            .await
            .unwrap();

        let report = service(&store).resolve_pending().await.unwrap();
        assert_eq!(report.rolled_back, 1);

        let ana = store.get("ana@example.com").await.unwrap();
        assert_eq!(ana.balance, dec!(100));
        assert_eq!(ana.version, sender.version + 2);
        assert_eq!(state_of(&store, &intent).await, IntentState::CompensatedFailure);
    }

    #[tokio::test]
    async fn test_later_write_makes_rollback_partial() {
        let store = Arc::new(MemoryStore::new());
        let (intent, sender, _) =
            interrupted_transfer(&store, dec!(50), 1, IntentState::SenderLegApplied).await;
        // Someone deposited after the crash
        store.force_update_balance(sender.id, dec!(55)).await.unwrap();

        let report = service(&store).resolve_pending().await.unwrap();
        assert_eq!(report.partial, 1);
        assert_eq!(store.get("ana@example.com").await.unwrap().balance, dec!(55));
        assert_eq!(state_of(&store, &intent).await, IntentState::CompensatedPartial);
    }

    #[tokio::test]
    async fn test_started_deposit_never_applied() {
        let store = Arc::new(MemoryStore::new());
        let account = seed(&store, "ana@example.com", dec!(10)).await;
        let intent = MutationIntent::single(
            TransactionType::Deposit,
            dec!(5),
            LegIntent::new(&account, dec!(15)),
        );
        store.record(&intent).await.unwrap();

        let report = service(&store).resolve_pending().await.unwrap();
        assert_eq!(report.rolled_back, 1);

        let after = store.get("ana@example.com").await.unwrap();
        assert_eq!(after.balance, dec!(10));
        assert_eq!(after.version, account.version);
    }

    #[tokio::test]
    async fn test_applied_withdraw_completes_forward() {
        let store = Arc::new(MemoryStore::new());
        let account = seed(&store, "ana@example.com", dec!(10)).await;
        let intent = MutationIntent::single(
            TransactionType::Withdraw,
            dec!(4),
            LegIntent::new(&account, dec!(6)),
        );
        store.record(&intent).await.unwrap();
        store.force_update_balance(account.id, dec!(6)).await.unwrap();
        store
            .update_state(intent.id, IntentState::SenderLegApplied)
            .await
            .unwrap();

        let report = service(&store).resolve_pending().await.unwrap();
        assert_eq!(report.completed, 1);

        let record = store
            .get_transaction(intent.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.transaction_type, TransactionType::Withdraw);
        assert_eq!(record.sender_id, account.id);
        assert_eq!(record.recipient_id, account.id);
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        interrupted_transfer(&store, dec!(50), 1, IntentState::SenderLegApplied).await;

        let service = service(&store);
        assert_eq!(service.resolve_pending().await.unwrap().rolled_back, 1);
        assert!(service.resolve_pending().await.unwrap().is_empty());
    }
}
