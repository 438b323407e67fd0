//! Serializable session state.
//!
//! Cookie and identity state for one storefront account, persisted as JSON.
//! Orchestration code never touches the filesystem on its own; callers save
//! and load at explicit checkpoints (after provisioning, after a batch,
//! after a checkout).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use emptor_core::Result;

/// Cookie carrying the cart token. A new value here after a mutating call
/// means the remote discarded the previous cart.
pub const CART_TOKEN_COOKIE: &str = "shoppingCartGID";

/// Cookie carrying the anti-forgery token required in mutating form posts.
pub const SESSION_ID_COOKIE: &str = "sessionid";

/// Cookie and identity state for one storefront account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub account_name: String,

    /// Cookies by name, for the storefront host only.
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    /// When this state last hit disk.
    pub saved_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(account_name: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            cookies: BTreeMap::new(),
            saved_at: Utc::now(),
        }
    }

    /// Load session state from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save session state to a JSON file, stamping `saved_at`.
    pub async fn save(&mut self, path: &Path) -> Result<()> {
        self.saved_at = Utc::now();
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}
