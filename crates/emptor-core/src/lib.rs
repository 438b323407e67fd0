//! # emptor-core
//!
//! Shared foundation for the emptor purchase orchestrator: the unified
//! error enum, the TOML configuration, and the job-layer data model
//! (batch items, cart tokens, checkout outcomes and reports).
//!
//! Emptor drives a third-party storefront that is free to reset its cart
//! state without warning. The types here encode that reality: results are
//! closed tagged enums the job layer matches exhaustively, and cart tokens
//! are first-class values because token identity is how silent resets are
//! detected.

pub mod config;
mod error;
pub mod types;

pub use config::{BillingProfile, BotConfig, CheckoutConfig, SessionConfig, StoreConfig};
pub use error::{Error, Result};
pub use types::*;
