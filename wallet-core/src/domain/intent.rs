//! Mutation intent - durable record of a balance mutation in flight
//!
//! An intent is written before the first leg touches an account. Its state
//! follows the mutation; whatever is left non-terminal after a crash is
//! resolved by the recovery service on the next start.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Account, TransactionType};

/// Position of a mutation in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    Started,
    SenderLegApplied,
    RecipientLegApplied,
    Logged,
    Compensating,
    CompensatedFailure,
    CompensatedPartial,
}

impl IntentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentState::Started => "started",
            IntentState::SenderLegApplied => "sender_leg_applied",
            IntentState::RecipientLegApplied => "recipient_leg_applied",
            IntentState::Logged => "logged",
            IntentState::Compensating => "compensating",
            IntentState::CompensatedFailure => "compensated_failure",
            IntentState::CompensatedPartial => "compensated_partial",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentState::Logged | IntentState::CompensatedFailure | IntentState::CompensatedPartial
        )
    }
}

impl fmt::Display for IntentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(IntentState::Started),
            "sender_leg_applied" => Ok(IntentState::SenderLegApplied),
            "recipient_leg_applied" => Ok(IntentState::RecipientLegApplied),
            "logged" => Ok(IntentState::Logged),
            "compensating" => Ok(IntentState::Compensating),
            "compensated_failure" => Ok(IntentState::CompensatedFailure),
            "compensated_partial" => Ok(IntentState::CompensatedPartial),
            other => Err(format!("unknown intent state: {}", other)),
        }
    }
}

/// One account's side of a mutation, captured before it is applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegIntent {
    pub account_id: Uuid,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub version_before: u64,
}

impl LegIntent {
    pub fn new(account: &Account, balance_after: Decimal) -> Self {
        Self {
            account_id: account.id,
            balance_before: account.balance,
            balance_after,
            version_before: account.version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationIntent {
    pub id: Uuid,
    /// Id the transaction log record will carry once written
    pub transaction_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub sender: LegIntent,
    pub recipient: Option<LegIntent>,
    pub state: IntentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MutationIntent {
    /// Intent for a single-account deposit or withdrawal
    pub fn single(transaction_type: TransactionType, amount: Decimal, leg: LegIntent) -> Self {
        Self::build(transaction_type, amount, leg, None)
    }

    /// Intent for a two-leg transfer
    pub fn transfer(amount: Decimal, sender: LegIntent, recipient: LegIntent) -> Self {
        Self::build(TransactionType::Transfer, amount, sender, Some(recipient))
    }

    fn build(
        transaction_type: TransactionType,
        amount: Decimal,
        sender: LegIntent,
        recipient: Option<LegIntent>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            transaction_type,
            amount,
            sender,
            recipient,
            state: IntentState::Started,
            created_at: now,
            updated_at: now,
        }
    }

    /// Every leg this mutation needs has been written
    pub fn all_legs_applied(&self) -> bool {
        match self.recipient {
            Some(_) => self.state == IntentState::RecipientLegApplied,
            None => matches!(
                self.state,
                IntentState::SenderLegApplied | IntentState::RecipientLegApplied
            ),
        }
    }

    /// Legs in application order
    pub fn legs(&self) -> impl Iterator<Item = &LegIntent> {
        std::iter::once(&self.sender).chain(self.recipient.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Principal;
    use rust_decimal_macros::dec;

    fn account(balance: Decimal) -> Account {
        let mut account = Account::new(&Principal::new(Uuid::new_v4(), "a@example.com"));
        account.balance = balance;
        account
    }

    #[test]
    fn test_state_round_trips_through_str() {
        for state in [
            IntentState::Started,
            IntentState::SenderLegApplied,
            IntentState::RecipientLegApplied,
            IntentState::Logged,
            IntentState::Compensating,
            IntentState::CompensatedFailure,
            IntentState::CompensatedPartial,
        ] {
            assert_eq!(state.as_str().parse::<IntentState>(), Ok(state));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(IntentState::Logged.is_terminal());
        assert!(IntentState::CompensatedPartial.is_terminal());
        assert!(!IntentState::Compensating.is_terminal());
        assert!(!IntentState::SenderLegApplied.is_terminal());
    }

    #[test]
    fn test_all_legs_applied_depends_on_shape() {
        let a = account(dec!(100));
        let b = account(dec!(20));

        let mut single = MutationIntent::single(
            TransactionType::Deposit,
            dec!(5),
            LegIntent::new(&a, dec!(105)),
        );
        assert!(!single.all_legs_applied());
        single.state = IntentState::SenderLegApplied;
        assert!(single.all_legs_applied());

        let mut transfer = MutationIntent::transfer(
            dec!(50),
            LegIntent::new(&a, dec!(50)),
            LegIntent::new(&b, dec!(70)),
        );
        transfer.state = IntentState::SenderLegApplied;
        assert!(!transfer.all_legs_applied());
        transfer.state = IntentState::RecipientLegApplied;
        assert!(transfer.all_legs_applied());
        assert_eq!(transfer.legs().count(), 2);
    }
}
