//! Profile service - account provisioning and lookup

use std::sync::Arc;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, Principal};
use crate::ports::AccountStore;

pub struct ProfileService {
    accounts: Arc<dyn AccountStore>,
}

impl ProfileService {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// Create the principal's account on first sight, refresh its profile
    /// fields afterwards. Balance is never reset.
    pub async fn ensure_account(&self, principal: &Principal) -> Result<Account> {
        principal.validate().map_err(Error::validation)?;
        self.accounts.upsert_profile(principal).await
    }

    pub async fn get_profile(&self, email: &str) -> Result<Account> {
        self.accounts.get(email).await.map_err(Error::classify)
    }
}
