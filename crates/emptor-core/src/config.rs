//! Configuration for the purchase orchestrator.
//!
//! Loaded from `emptor.toml` (or a path given on the command line). Every
//! field carries a serde default so partial files parse; a missing file
//! yields the full default configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Top-level configuration for one emptor process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Storefront endpoint settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Checkout protocol tuning
    #[serde(default)]
    pub checkout: CheckoutConfig,

    /// Billing identity sent with init-transaction
    #[serde(default)]
    pub billing: BillingProfile,

    /// Session state storage
    #[serde(default)]
    pub session: SessionConfig,
}

/// Storefront endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storefront origin, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Billing country code sent with init-transaction.
    #[serde(default = "default_country")]
    pub country: String,
}

/// Checkout protocol tuning.
///
/// The poll budget and interval are configuration rather than constants so
/// the job layer can run a cheap short poll (fire and continue) or a long
/// poll (block until completion) against the same protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Maximum status polls per transaction before giving up.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Delay before each status poll, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Message placed on the gift.
    #[serde(default = "default_gift_message")]
    pub gift_message: String,

    /// Signature placed on the gift.
    #[serde(default = "default_gift_signature")]
    pub gift_signature: String,
}

impl CheckoutConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Billing identity sent with init-transaction.
///
/// The storefront requires these fields to be present in the form even
/// when blank.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingProfile {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub phone: String,
}

/// Session state storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding provisioned `<account>.json` session files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

// Default value providers
fn default_base_url() -> String {
    "https://store.example.com".to_string()
}

fn default_country() -> String {
    "US".to_string()
}

fn default_max_poll_attempts() -> u32 {
    25
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_gift_message() -> String {
    "Enjoy!".to_string()
}

fn default_gift_signature() -> String {
    "Your friends".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl BotConfig {
    /// Load configuration from `path` or use defaults when no file exists.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| {
                Error::Config(format!("failed to parse {}: {}", path.display(), e))
            })
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default configuration to `path`.
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| Error::Config(format!("failed to serialize defaults: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the session state file for one account.
    pub fn session_file(&self, account: &str) -> PathBuf {
        self.session.data_dir.join(format!("{}.json", account))
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            checkout: CheckoutConfig::default(),
            billing: BillingProfile::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            country: default_country(),
        }
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: default_max_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            gift_message: default_gift_message(),
            gift_signature: default_gift_signature(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}
