//! Job-layer data model for the purchase orchestrator.
//!
//! Everything in this module crosses the bot facade boundary and is
//! serializable, so the job layer can persist results and route them
//! between workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque identifier naming the current instance of the remote shopping
/// cart (the `shoppingCartGID` cookie value).
///
/// A changed token after a mutating call means the remote side discarded
/// the previous cart; anything attributed to the old token is no longer
/// trustworthy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartToken(String);

impl CartToken {
    pub fn new(raw: impl Into<String>) -> Self {
        CartToken(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CartToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of work for the add-item orchestrator.
///
/// `relation_type` and `relation_id` are owned by the job layer and never
/// interpreted here; they round-trip unchanged into the result lists.
/// `sub_id` is the remote catalog identifier actually added to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchItem {
    pub relation_type: String,
    pub relation_id: i64,
    pub sub_id: u64,
}

/// Classification of a single add-to-cart attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddItemOutcome {
    /// The item count grew and the storefront confirmed the add.
    Added,
    /// The cart is unchanged under the same token.
    Failed,
    /// The add landed but gift checkout is no longer offered.
    CartNotGifteable,
    /// The cart token vanished entirely.
    CartDisappeared,
    /// The remote replaced the cart with one under a new token.
    CartReset,
}

/// Result of one batch of add-to-cart attempts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchResult {
    pub succeeded_items: Vec<BatchItem>,
    pub failed_items: Vec<BatchItem>,
    /// Tokens the remote discarded mid-batch. Successes accumulated under
    /// them were moved to `failed_items`.
    pub invalidated_cart_tokens: BTreeSet<CartToken>,
    pub final_cart_token: Option<CartToken>,
}

/// How a checkout is funded.
///
/// The orchestrator interprets exactly two methods: `AccountBalance`
/// (price check compares the cart total against the wallet) and `Bitcoin`
/// (finalize/poll are skipped in favor of an external payment link).
/// Anything else passes through to the storefront untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    AccountBalance,
    Bitcoin,
    Other(String),
}

impl PaymentMethod {
    /// Value sent in the `PaymentMethod` form field.
    pub fn wire_name(&self) -> &str {
        match self {
            PaymentMethod::AccountBalance => "account",
            PaymentMethod::Bitcoin => "bitcoin",
            PaymentMethod::Other(name) => name,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "account" => PaymentMethod::AccountBalance,
            "bitcoin" => PaymentMethod::Bitcoin,
            other => PaymentMethod::Other(other.to_string()),
        })
    }
}

/// What the price check concluded.
///
/// The wallet comparison only happens for `PaymentMethod::AccountBalance`;
/// every other method leaves the decision `Undetermined`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceDecision {
    Success,
    InsufficientFunds,
    #[default]
    Undetermined,
}

/// Closed set of terminal checkout results.
///
/// These are values the job layer branches on, not errors. No further
/// protocol step runs for a call once one of these is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    /// The poll stage observed the terminal ok status.
    Purchased,
    /// Bitcoin branch: the transaction is initialized and priced, but no
    /// charge has occurred; an external payment link must be redeemed out
    /// of band.
    AwaitingExternalPayment,
    /// No cart token existed when checkout started.
    CartTokenMissing,
    /// Init-transaction was refused or returned no transaction id.
    InitFailed,
    /// The remote rate-limited the account (`transid == "-1"`).
    TooManyPurchases,
    /// The cart total exceeds the wallet balance.
    InsufficientFunds,
    /// The final-price call failed or was refused.
    PriceCheckFailed,
    /// The finalize call failed or was refused.
    FinalizeFailed,
    /// The poll stage observed a terminal non-success code.
    Declined { status: i64 },
    /// The poll budget ran out while the transaction was still pending.
    PollBudgetExhausted,
}

/// Parameters for one checkout call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CheckoutRequest {
    pub giftee_account_id: u64,
    pub payment_method: PaymentMethod,
}

/// What the facade hands back for external bookkeeping after a checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CheckoutReport {
    pub outcome: CheckoutOutcome,
    pub transaction_id: Option<String>,
    /// Token the checkout ran against, when one existed at the start.
    pub cart_token: Option<CartToken>,
    pub price_decision: PriceDecision,
    pub poll_attempts_used: u32,
    pub completed_at: DateTime<Utc>,
}

/// Wallet and cart headline numbers for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AccountSummary {
    pub account_name: String,
    /// Raw price text as rendered by the storefront header, when present.
    pub wallet_balance: Option<String>,
    pub cart_item_count: u32,
}
