//! Transaction domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of balance mutation a transaction records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
            TransactionType::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deposit" => Ok(TransactionType::Deposit),
            "withdraw" => Ok(TransactionType::Withdraw),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// An immutable ledger entry
///
/// Deposits and withdrawals carry the acting account as both sender and
/// recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a transaction stamped with the current time
    pub fn new(
        id: Uuid,
        transaction_type: TransactionType,
        amount: Decimal,
        sender_id: Uuid,
        recipient_id: Uuid,
    ) -> Self {
        Self {
            id,
            amount,
            transaction_type,
            sender_id,
            recipient_id,
            created_at: Utc::now(),
        }
    }

    /// True if the account is on either side of this entry
    pub fn touches(&self, account_id: Uuid) -> bool {
        self.sender_id == account_id || self.recipient_id == account_id
    }

    /// Validate transaction data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.amount <= Decimal::ZERO {
            return Err("amount must be positive");
        }
        let same_account = self.sender_id == self.recipient_id;
        match self.transaction_type {
            TransactionType::Transfer if same_account => {
                Err("transfer sender and recipient must differ")
            }
            TransactionType::Deposit | TransactionType::Withdraw if !same_account => {
                Err("deposit and withdraw must name a single account")
            }
            _ => Ok(()),
        }
    }
}
