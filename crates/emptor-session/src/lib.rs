//! # emptor-session
//!
//! Authenticated storefront sessions: explicit serializable cookie state,
//! the `Session` trait the orchestrators are generic over, a reqwest-backed
//! implementation, and acquisition of provisioned session files from disk.
//!
//! Cookie state lives in a plain serializable map instead of a
//! client-internal jar. Cart-reset detection reads the cart token straight
//! out of that map, and the job layer persists it at explicit checkpoints,
//! so the state has to be inspectable.

pub mod provider;
pub mod state;
pub mod store;

pub use provider::{FileSessionProvider, SessionProvider};
pub use state::{SessionState, CART_TOKEN_COOKIE, SESSION_ID_COOKIE};
pub use store::{Session, StoreSession, WireResponse};
