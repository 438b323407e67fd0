//! Session acquisition.
//!
//! Session files are provisioned by an external credential service; this
//! module turns them into live sessions and refuses stale ones. The
//! contract is "give me a session that is logged in, or tell me it
//! failed", nothing more.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use emptor_core::{Error, Result};

use crate::state::SessionState;
use crate::store::StoreSession;

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Produce a logged-in session for `account` or fail with
    /// `Error::NotLoggedIn`.
    async fn acquire(&self, account: &str) -> Result<StoreSession>;
}

/// Loads provisioned `<account>.json` session files from a data directory.
pub struct FileSessionProvider {
    data_dir: PathBuf,
    base_url: String,
}

impl FileSessionProvider {
    pub fn new(data_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            base_url: base_url.into(),
        }
    }

    fn session_file(&self, account: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", account))
    }
}

#[async_trait]
impl SessionProvider for FileSessionProvider {
    async fn acquire(&self, account: &str) -> Result<StoreSession> {
        let path = self.session_file(account);
        if !path.exists() {
            return Err(Error::NotLoggedIn(account.to_string()));
        }

        let state = SessionState::load(&path).await?;
        if state.account_name != account {
            return Err(Error::Config(format!(
                "session file {} belongs to account {}, not {}",
                path.display(),
                state.account_name,
                account
            )));
        }

        let mut session = StoreSession::new(self.base_url.clone(), state)?;
        if !session.is_logged_in().await? {
            return Err(Error::NotLoggedIn(account.to_string()));
        }

        info!(account, "session acquired");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_session_file_means_not_logged_in() {
        let dir = tempfile::tempdir().unwrap();
        let provider =
            FileSessionProvider::new(dir.path(), "https://store.example.com");

        let err = provider.acquire("alice").await.unwrap_err();
        assert!(matches!(err, Error::NotLoggedIn(account) if account == "alice"));
    }

    #[tokio::test]
    async fn mismatched_account_name_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = SessionState::new("bob");
        state.save(&dir.path().join("alice.json")).await.unwrap();

        let provider =
            FileSessionProvider::new(dir.path(), "https://store.example.com");
        let err = provider.acquire("alice").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
