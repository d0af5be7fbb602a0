//! Account domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A wallet account, one per verified principal
///
/// `version` is bumped by every balance write and is the token checked by
/// conditional updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub balance: Decimal,
    pub first_name: String,
    pub last_name: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create an empty account for a principal
    pub fn new(principal: &Principal) -> Self {
        let now = Utc::now();
        Self {
            id: principal.id,
            email: principal.email.clone(),
            balance: Decimal::ZERO,
            first_name: principal.first_name.clone(),
            last_name: principal.last_name.clone(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Full display name
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Verified identity handed to the core by the identity resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl Principal {
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    /// Set first and last name
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    /// Validate principal data
    pub fn validate(&self) -> Result<(), &'static str> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err("email cannot be empty");
        }
        if !email.contains('@') {
            return Err("email must contain '@'");
        }
        Ok(())
    }
}
