//! Purchase bot facade.
//!
//! One [`PurchaseBot`] per managed account, composing the add-item
//! orchestrator and the checkout driver behind the calls the job layer
//! makes. Every operation takes `&mut self`: the bot owns its session
//! exclusively, so at most one orchestration per account runs at a time
//! in-process. Across processes the job layer must serialize per
//! account on its own.

use emptor_core::{
    AccountSummary, BatchItem, BatchResult, BotConfig, CheckoutReport, CheckoutRequest, Result,
};
use emptor_session::Session;

use crate::batch;
use crate::checkout::{run_checkout, TokioDelay};
use crate::snapshot::{parse_wallet_balance, CartSnapshot};
use crate::tracker;
use crate::wire;

pub struct PurchaseBot<S: Session> {
    session: S,
    config: BotConfig,
}

impl<S: Session> PurchaseBot<S> {
    pub fn new(session: S, config: BotConfig) -> Self {
        Self { session, config }
    }

    /// Account this bot drives.
    pub fn account_name(&self) -> &str {
        self.session.account_name()
    }

    /// Session access for checkpoint persistence.
    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Add a batch of items to the cart. See [`batch::add_batch`].
    pub async fn add_items_to_cart(&mut self, items: &[BatchItem]) -> Result<BatchResult> {
        batch::add_batch(&mut self.session, items).await
    }

    /// Drive one checkout to a terminal outcome. See
    /// [`run_checkout`](crate::checkout::run_checkout).
    pub async fn checkout(&mut self, request: &CheckoutRequest) -> Result<CheckoutReport> {
        run_checkout(&mut self.session, &TokioDelay, &self.config, request).await
    }

    /// Current cart contents.
    pub async fn cart(&mut self) -> Result<CartSnapshot> {
        tracker::fetch_snapshot(&mut self.session).await
    }

    /// Wallet balance and cart headline numbers for bookkeeping.
    pub async fn account_summary(&mut self) -> Result<AccountSummary> {
        let front = self.session.get("/", &[]).await?;
        let wallet_balance = if front.status == 200 {
            parse_wallet_balance(&front.body)
        } else {
            None
        };
        let snapshot = tracker::fetch_snapshot(&mut self.session).await?;
        Ok(AccountSummary {
            account_name: self.session.account_name().to_string(),
            wallet_balance,
            cart_item_count: snapshot.item_count,
        })
    }

    /// Payment redirect target for an externally funded transaction.
    pub async fn external_payment_link(&mut self, transaction_id: &str) -> Result<String> {
        wire::external_payment_link(&mut self.session, transaction_id).await
    }
}
