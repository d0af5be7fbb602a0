//! Configuration management
//!
//! Reads settings.json from the wallet directory:
//! ```json
//! {
//!   "ledger": { "guardRecipientLeg": false, "recoverOnStartup": true },
//!   "principals": { "<token>": { "id": "...", "email": "...", "firstName": "...", "lastName": "..." } }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::Principal;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    ledger: LedgerSettings,
    #[serde(default)]
    principals: HashMap<String, Principal>,
    /// Everything we don't manage, written back untouched
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Ledger engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSettings {
    /// Guard the transfer recipient leg with its observed version instead of
    /// writing it unconditionally
    #[serde(default)]
    pub guard_recipient_leg: bool,
    /// Resolve unfinished mutations when the context opens
    #[serde(default = "default_true")]
    pub recover_on_startup: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            guard_recipient_leg: false,
            recover_on_startup: true,
        }
    }
}

/// Wallet configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub ledger: LedgerSettings,
    /// Token -> principal map used by the static identity resolver
    pub principals: HashMap<String, Principal>,
    // Keep the raw settings for preservation when saving
    raw_settings: SettingsFile,
}

impl Config {
    /// Load config from the wallet directory
    ///
    /// Ledger flags can be overridden with WALLET_GUARD_RECIPIENT_LEG and
    /// WALLET_RECOVER_ON_STARTUP.
    pub fn load(wallet_dir: &Path) -> Result<Self> {
        let settings_path = wallet_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings file {}", settings_path.display()))?
        } else {
            SettingsFile::default()
        };

        let mut ledger = raw.ledger;
        if let Some(flag) = env_flag("WALLET_GUARD_RECIPIENT_LEG") {
            ledger.guard_recipient_leg = flag;
        }
        if let Some(flag) = env_flag("WALLET_RECOVER_ON_STARTUP") {
            ledger.recover_on_startup = flag;
        }

        Ok(Self {
            ledger,
            principals: raw.principals.clone(),
            raw_settings: raw,
        })
    }

    /// Save config to the wallet directory
    /// Preserves other settings that the CLI doesn't manage
    pub fn save(&self, wallet_dir: &Path) -> Result<()> {
        let settings_path = wallet_dir.join("settings.json");

        // Re-read so edits made since load are not clobbered
        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content)
                .unwrap_or_else(|_| self.raw_settings.clone())
        } else {
            self.raw_settings.clone()
        };

        settings.principals = self.principals.clone();

        std::fs::create_dir_all(wallet_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    /// Register a token for a principal, replacing any previous mapping
    pub fn add_principal(&mut self, token: impl Into<String>, principal: Principal) {
        self.principals.insert(token.into(), principal);
    }
}

fn env_flag(name: &str) -> Option<bool> {
    match std::env::var(name).ok().as_deref() {
        Some("true" | "1" | "yes" | "TRUE" | "YES") => Some(true),
        Some("false" | "0" | "no" | "FALSE" | "NO") => Some(false),
        _ => None,
    }
}
