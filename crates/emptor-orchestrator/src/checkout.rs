//! Checkout driver.
//!
//! Walks the pure machine in `protocol` with real wire calls, one call
//! per state, and maps each wire result to the matching event. Wire
//! failures at a stage become that stage's failure event; non-wire
//! errors abort the checkout and propagate. The poll delay is injected
//! so tests run without real time.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use emptor_core::{
    BotConfig, CheckoutOutcome, CheckoutReport, CheckoutRequest, PaymentMethod, PriceDecision,
    Result,
};
use emptor_session::Session;

use crate::protocol::{CheckoutProtocol, Event, State};
use crate::wire::{self, InitOutcome, PriceQuote, TransactionCode};

/// Injected clock for the poll interval.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real delay on the tokio timer.
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bookkeeping accumulated while one checkout runs, consumed into the
/// final report.
#[derive(Debug, Default)]
struct TransactionAttempt {
    transaction_id: Option<String>,
    price_decision: PriceDecision,
    poll_attempts_used: u32,
}

/// Drive one checkout to a terminal outcome.
///
/// Always lands on a [`CheckoutOutcome`] unless a non-wire error (I/O,
/// a machine invariant breach) forces an early return. Only a
/// `Purchased` outcome clears the session's cart token.
pub async fn run_checkout<S: Session, D: Delay>(
    session: &mut S,
    delay: &D,
    config: &BotConfig,
    request: &CheckoutRequest,
) -> Result<CheckoutReport> {
    let protocol = CheckoutProtocol::new(
        request.payment_method.clone(),
        config.checkout.max_poll_attempts,
    );
    let mut attempt = TransactionAttempt::default();
    let starting_token = session.current_cart_token();

    info!(
        account = session.account_name(),
        method = %request.payment_method,
        giftee = request.giftee_account_id,
        "starting checkout"
    );

    let mut state = State::AwaitingToken;
    let outcome = loop {
        let event = match &state {
            State::AwaitingToken => match starting_token.clone() {
                Some(token) => Event::TokenFound(token),
                None => Event::TokenMissing,
            },

            State::Initiating { token } => {
                wire::checkout_warmup(session).await;
                match wire::init_transaction(session, token, request, config).await {
                    Ok(InitOutcome::Started { transaction_id }) => {
                        debug!(transaction_id = %transaction_id, "transaction opened");
                        attempt.transaction_id = Some(transaction_id.clone());
                        Event::InitSucceeded { transaction_id }
                    }
                    Ok(InitOutcome::RateLimited) => Event::InitRateLimited,
                    Ok(InitOutcome::Rejected) => Event::InitRejected,
                    Err(e) if e.is_wire_failure() => {
                        warn!(error = %e, "init transaction failed");
                        Event::InitRejected
                    }
                    Err(e) => return Err(e),
                }
            }

            State::CheckingPrice {
                token,
                transaction_id,
            } => match wire::final_price(session, token, transaction_id).await {
                Ok(Some(quote)) => price_event(&request.payment_method, quote, &mut attempt),
                Ok(None) => Event::PriceRefused,
                Err(e) if e.is_wire_failure() => {
                    warn!(error = %e, "price check failed");
                    Event::PriceRefused
                }
                Err(e) => return Err(e),
            },

            State::Finalizing { transaction_id } => {
                match wire::finalize_transaction(session, transaction_id).await {
                    Ok(code)
                        if code == TransactionCode::OK || code == TransactionCode::PENDING =>
                    {
                        Event::FinalizeAccepted
                    }
                    Ok(code) => {
                        warn!(code = code.0, "finalize refused");
                        Event::FinalizeRejected
                    }
                    Err(e) if e.is_wire_failure() => {
                        warn!(error = %e, "finalize failed");
                        Event::FinalizeRejected
                    }
                    Err(e) => return Err(e),
                }
            }

            State::Polling {
                transaction_id,
                attempts_used,
            } => {
                delay.sleep(config.checkout.poll_interval()).await;
                attempt.poll_attempts_used = attempts_used + 1;
                debug!(attempt = attempt.poll_attempts_used, "polling transaction status");
                match wire::transaction_status(session, transaction_id).await {
                    Ok(code) => Event::PollStatus(code),
                    Err(e) if e.is_wire_failure() => {
                        warn!(error = %e, "status poll failed");
                        Event::PollErrored
                    }
                    Err(e) => return Err(e),
                }
            }

            State::Done { outcome, .. } => break *outcome,
        };

        state = protocol.transition(state, event)?;
    };

    if outcome == CheckoutOutcome::Purchased {
        // The next batch must start a fresh cart.
        session.clear_cart_token();
    }

    let report = CheckoutReport {
        outcome,
        transaction_id: attempt.transaction_id,
        cart_token: starting_token,
        price_decision: attempt.price_decision,
        poll_attempts_used: attempt.poll_attempts_used,
        completed_at: Utc::now(),
    };
    info!(
        outcome = ?report.outcome,
        polls = report.poll_attempts_used,
        "checkout finished"
    );
    Ok(report)
}

/// Decide what an accepted quote means for the configured payment
/// method. Balance comparison only applies to account balance payments;
/// every other method settles elsewhere and proceeds.
fn price_event(
    method: &PaymentMethod,
    quote: PriceQuote,
    attempt: &mut TransactionAttempt,
) -> Event {
    if *method != PaymentMethod::AccountBalance {
        return Event::PriceAccepted;
    }
    match quote.account_balance {
        Some(balance) if quote.total > balance => {
            warn!(total = quote.total, balance, "wallet cannot cover the cart");
            attempt.price_decision = PriceDecision::InsufficientFunds;
            Event::PriceInsufficient
        }
        Some(_) => {
            attempt.price_decision = PriceDecision::Success;
            Event::PriceAccepted
        }
        // No balance in the quote; proceed undetermined.
        None => Event::PriceAccepted,
    }
}
