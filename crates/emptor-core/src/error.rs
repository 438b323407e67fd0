//! Unified error types for emptor

use thiserror::Error;

/// Unified error type for all emptor operations
#[derive(Error, Debug)]
pub enum Error {
    // Wire errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status} from {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("could not parse storefront response: {0}")]
    Parse(String),

    // Session errors
    #[error("account {0} is not logged in")]
    NotLoggedIn(String),

    // Checkout errors
    #[error("checkout protocol violation: {0}")]
    Protocol(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for failures of a single wire call: the remote was unreachable,
    /// answered with the wrong status, or sent a body we could not read.
    /// The orchestrators downgrade this class to per-item skips or
    /// per-stage terminal outcomes; every other variant propagates to the
    /// job layer untouched.
    pub fn is_wire_failure(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::UnexpectedStatus { .. } | Error::Parse(_)
        )
    }
}

/// Result type alias using the emptor Error type
pub type Result<T> = std::result::Result<T, Error>;
