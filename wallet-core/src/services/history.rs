//! History projection - signed, directional views of an account's records

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Transaction, TransactionType};
use crate::ports::{AccountStore, TransactionLog};

/// One transaction as seen by a particular account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Signed from the viewer's side: money in is positive
    pub amount: Decimal,
    pub is_positive: bool,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub sender_email: Option<String>,
    pub recipient_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Whether a record adds to the viewer's balance
fn credits_viewer(record: &Transaction, viewer: Uuid) -> bool {
    match record.transaction_type {
        TransactionType::Deposit => true,
        TransactionType::Withdraw => false,
        TransactionType::Transfer => record.recipient_id == viewer,
    }
}

pub struct HistoryService {
    accounts: Arc<dyn AccountStore>,
    log: Arc<dyn TransactionLog>,
}

impl HistoryService {
    pub fn new(accounts: Arc<dyn AccountStore>, log: Arc<dyn TransactionLog>) -> Self {
        Self { accounts, log }
    }

    /// Every record touching the viewer, newest first, optionally of one kind
    pub async fn get_transaction_history(
        &self,
        email: &str,
        kind: Option<TransactionType>,
    ) -> Result<Vec<TransactionView>> {
        let viewer = self.accounts.get(email).await.map_err(Error::classify)?;

        let mut records = self
            .log
            .list_for_account(viewer.id)
            .await
            .map_err(Error::classify)?;
        if let Some(kind) = kind {
            records.retain(|r| r.transaction_type == kind);
        }
        // Stable, so the store's insertion tie-break survives
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut emails: HashMap<Uuid, Option<String>> = HashMap::new();
        emails.insert(viewer.id, Some(viewer.email.clone()));

        let mut views = Vec::with_capacity(records.len());
        for record in records {
            let sender_email = self.email_for(&mut emails, record.sender_id).await;
            let recipient_email = self.email_for(&mut emails, record.recipient_id).await;
            let is_positive = credits_viewer(&record, viewer.id);

            views.push(TransactionView {
                id: record.id,
                transaction_type: record.transaction_type,
                amount: if is_positive { record.amount } else { -record.amount },
                is_positive,
                sender_id: record.sender_id,
                recipient_id: record.recipient_id,
                sender_email,
                recipient_email,
                created_at: record.created_at,
            });
        }
        Ok(views)
    }

    /// Counterpart lookups are enrichment only; a failed read leaves the
    /// email empty rather than failing the whole history.
    async fn email_for(
        &self,
        cache: &mut HashMap<Uuid, Option<String>>,
        id: Uuid,
    ) -> Option<String> {
        if let Some(cached) = cache.get(&id) {
            return cached.clone();
        }
        let email = match self.accounts.get_by_id(id).await {
            Ok(account) => account.map(|a| a.email),
            Err(e) => {
                tracing::warn!(account = %id, "counterpart lookup failed: {}", e);
                None
            }
        };
        cache.insert(id, email.clone());
        email
    }
}
