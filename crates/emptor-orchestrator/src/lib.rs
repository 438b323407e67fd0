//! # emptor-orchestrator
//!
//! Cart-build and checkout transaction orchestration against a
//! non-idempotent storefront.
//!
//! The job layer talks to [`PurchaseBot`], one per managed account. Under
//! it, `batch` walks add-item batches against a cart the remote may
//! silently replace, `tracker` interprets cart pages around each mutating
//! call, and `checkout` drives the pure state machine in `protocol`
//! through the four-stage purchase flow over the `Session` seam.

pub mod batch;
pub mod bot;
pub mod checkout;
pub mod protocol;
pub mod snapshot;
pub mod tracker;
pub mod wire;

#[cfg(test)]
pub(crate) mod testkit;

pub use bot::PurchaseBot;
pub use snapshot::{CartLineItem, CartSnapshot};
