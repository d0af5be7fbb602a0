//! Ledger engine - balance mutations under optimistic concurrency
//!
//! Every mutation follows the same shape: read the accounts, compute the new
//! balances, record a durable intent, apply each leg, append the transaction
//! record, and mark the intent logged. Guarded legs use the account version
//! as the concurrency token. A failure after a leg has committed triggers a
//! compensating write that restores the observed balance.
//!
//! Nothing here retries. A tripped guard surfaces as `Error::Conflict` and the
//! caller decides whether to resubmit.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::LedgerSettings;
use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, IntentState, LegIntent, MutationIntent, Transaction, TransactionType,
};
use crate::ports::{AccountStore, IntentLog, TransactionLog};

/// Amounts are stored with four decimal places
pub const MAX_AMOUNT_SCALE: u32 = 4;

/// Largest value a `DECIMAL(18, 4)` column holds; bounds amounts and balances
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_808_348_671, 232_830_643, 0, false, 4);

/// Outcome of a deposit or withdrawal
#[derive(Debug, Clone, Serialize)]
pub struct BalanceChange {
    pub transaction: Transaction,
    pub balance: Decimal,
}

/// Outcome of a transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub transaction: Transaction,
    pub sender_balance: Decimal,
    pub recipient_balance: Decimal,
}

pub struct LedgerEngine {
    accounts: Arc<dyn AccountStore>,
    log: Arc<dyn TransactionLog>,
    intents: Arc<dyn IntentLog>,
    settings: LedgerSettings,
}

impl LedgerEngine {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        log: Arc<dyn TransactionLog>,
        intents: Arc<dyn IntentLog>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            accounts,
            log,
            intents,
            settings,
        }
    }

    /// Deposit into or withdraw from the account owning `email`
    pub async fn deposit_or_withdraw(
        &self,
        email: &str,
        amount: Decimal,
        kind: TransactionType,
    ) -> Result<BalanceChange> {
        validate_amount(amount)?;

        let account = self.accounts.get(email).await.map_err(Error::classify)?;

        let candidate = match kind {
            TransactionType::Deposit => credit(account.balance, amount)?,
            TransactionType::Withdraw => debit(account.balance, amount)?,
            TransactionType::Transfer => {
                return Err(Error::validation(
                    "transfers must name a recipient; use transfer instead",
                ))
            }
        };

        let intent = MutationIntent::single(kind, amount, LegIntent::new(&account, candidate));
        self.record_intent(&intent).await?;

        let updated = match self
            .accounts
            .conditional_update_balance(account.id, account.version, candidate)
            .await
        {
            Ok(updated) => updated,
            Err(e) => return Err(self.abandon(&intent, e).await),
        };
        self.advance(&intent, IntentState::SenderLegApplied).await;

        let record = Transaction::new(intent.transaction_id, kind, amount, account.id, account.id);
        if let Err(e) = self.log.append(&record).await {
            tracing::error!(
                intent = %intent.id,
                transaction = %record.id,
                "failed to log {}: {}",
                kind,
                e
            );
            self.compensate(&intent, &[&intent.sender]).await;
            return Err(Error::internal(format!("failed to record {}: {}", kind, e)));
        }

        self.advance(&intent, IntentState::Logged).await;
        Ok(BalanceChange {
            transaction: record,
            balance: updated.balance,
        })
    }

    /// Move `amount` from the sender to the recipient
    ///
    /// The sender leg is guarded by its observed version. The recipient leg
    /// is written unconditionally unless `guard_recipient_leg` is set, so two
    /// concurrent transfers into the same account can race on it.
    pub async fn transfer(
        &self,
        sender_email: &str,
        recipient_email: &str,
        amount: Decimal,
    ) -> Result<TransferResult> {
        if sender_email == recipient_email {
            return Err(Error::validation("cannot transfer to the same account"));
        }
        validate_amount(amount)?;

        let sender = self
            .accounts
            .get(sender_email)
            .await
            .map_err(Error::classify)?;
        let recipient = self
            .accounts
            .get(recipient_email)
            .await
            .map_err(Error::classify)?;

        let sender_balance = debit(sender.balance, amount)?;
        let recipient_balance = credit(recipient.balance, amount)?;

        let intent = MutationIntent::transfer(
            amount,
            LegIntent::new(&sender, sender_balance),
            LegIntent::new(&recipient, recipient_balance),
        );
        self.record_intent(&intent).await?;

        let sender_after = match self
            .accounts
            .conditional_update_balance(sender.id, sender.version, sender_balance)
            .await
        {
            Ok(updated) => updated,
            Err(e) => return Err(self.abandon(&intent, e).await),
        };
        self.advance(&intent, IntentState::SenderLegApplied).await;

        let recipient_after = match self
            .apply_recipient_leg(&recipient, recipient_balance)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(
                    intent = %intent.id,
                    recipient = %recipient.id,
                    "recipient leg failed, restoring sender: {}",
                    e
                );
                self.compensate(&intent, &[&intent.sender]).await;
                return Err(match e {
                    Error::Conflict(msg) => Error::Conflict(msg),
                    other => Error::conflict(format!("recipient update failed: {}", other)),
                });
            }
        };
        self.advance(&intent, IntentState::RecipientLegApplied).await;

        let record = Transaction::new(
            intent.transaction_id,
            TransactionType::Transfer,
            amount,
            sender.id,
            recipient.id,
        );
        if let Err(e) = self.log.append(&record).await {
            tracing::error!(
                intent = %intent.id,
                transaction = %record.id,
                "failed to log transfer: {}",
                e
            );
            // Undo in reverse application order
            let mut legs: Vec<&LegIntent> = intent.legs().collect();
            legs.reverse();
            self.compensate(&intent, &legs).await;
            return Err(Error::internal(format!("failed to record transfer: {}", e)));
        }

        self.advance(&intent, IntentState::Logged).await;
        Ok(TransferResult {
            transaction: record,
            sender_balance: sender_after.balance,
            recipient_balance: recipient_after.balance,
        })
    }

    async fn apply_recipient_leg(
        &self,
        recipient: &Account,
        new_balance: Decimal,
    ) -> Result<Account> {
        if self.settings.guard_recipient_leg {
            self.accounts
                .conditional_update_balance(recipient.id, recipient.version, new_balance)
                .await
        } else {
            self.accounts
                .force_update_balance(recipient.id, new_balance)
                .await
        }
    }

    async fn record_intent(&self, intent: &MutationIntent) -> Result<()> {
        self.intents
            .record(intent)
            .await
            .map_err(|e| Error::internal(format!("failed to record mutation intent: {}", e)))
    }

    /// First leg never applied: close the intent and classify the error
    async fn abandon(&self, intent: &MutationIntent, err: Error) -> Error {
        if err.is_retryable() {
            tracing::warn!(intent = %intent.id, "concurrent update detected: {}", err);
        }
        self.advance(intent, IntentState::CompensatedFailure).await;
        err.classify()
    }

    /// Restore each leg's observed balance, in the order given
    ///
    /// Each restore is attempted once. A failed restore is logged and leaves
    /// the intent `compensated_partial` for an operator to inspect.
    async fn compensate(&self, intent: &MutationIntent, legs: &[&LegIntent]) {
        self.advance(intent, IntentState::Compensating).await;

        let mut clean = true;
        for leg in legs {
            if let Err(e) = self
                .accounts
                .force_update_balance(leg.account_id, leg.balance_before)
                .await
            {
                clean = false;
                tracing::error!(
                    intent = %intent.id,
                    account = %leg.account_id,
                    "compensation failed, balance left at {}: {}",
                    leg.balance_after,
                    e
                );
            }
        }

        let terminal = if clean {
            IntentState::CompensatedFailure
        } else {
            IntentState::CompensatedPartial
        };
        self.advance(intent, terminal).await;
    }

    /// Intent transitions after the first leg never change the outcome
    async fn advance(&self, intent: &MutationIntent, state: IntentState) {
        if let Err(e) = self.intents.update_state(intent.id, state).await {
            tracing::warn!(intent = %intent.id, state = %state, "failed to update intent: {}", e);
        }
    }
}

fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::validation("amount must be positive"));
    }
    if amount > MAX_AMOUNT {
        return Err(Error::validation(format!("amount exceeds {}", MAX_AMOUNT)));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(Error::validation(format!(
            "amount supports at most {} decimal places",
            MAX_AMOUNT_SCALE
        )));
    }
    Ok(())
}

/// Balance after crediting `amount`, bounded by what storage can hold
fn credit(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    balance
        .checked_add(amount)
        .filter(|b| *b <= MAX_AMOUNT)
        .ok_or_else(|| Error::validation(format!("balance would exceed {}", MAX_AMOUNT)))
}

/// Balance after debiting `amount`; overdrawing is rejected
fn debit(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    if amount > balance {
        return Err(Error::validation("insufficient funds"));
    }
    balance
        .checked_sub(amount)
        .ok_or_else(|| Error::validation("insufficient funds"))
}
