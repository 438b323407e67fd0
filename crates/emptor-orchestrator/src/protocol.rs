//! Pure checkout state machine.
//!
//! No I/O and no clock in here. The driver in `checkout` performs one
//! wire call per state and feeds the result back in as an [`Event`];
//! every decision about what the checkout does next lives in
//! [`CheckoutProtocol::transition`]. Feeding an event that makes no
//! sense in the current state is a programmer error and comes back as
//! `Error::Protocol`; the machine itself never panics.

use emptor_core::{CartToken, CheckoutOutcome, Error, PaymentMethod, Result};

use crate::wire::TransactionCode;

/// Where a checkout currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Nothing sent yet; cart token presence not yet checked.
    AwaitingToken,
    /// Token in hand, init-transaction outstanding.
    Initiating { token: CartToken },
    /// Transaction open, price check outstanding.
    CheckingPrice {
        token: CartToken,
        transaction_id: String,
    },
    /// Price accepted, finalize outstanding.
    Finalizing { transaction_id: String },
    /// Finalize accepted, polling for a terminal status.
    Polling {
        transaction_id: String,
        attempts_used: u32,
    },
    /// Terminal.
    Done {
        outcome: CheckoutOutcome,
        transaction_id: Option<String>,
    },
}

/// One observed wire result, translated for the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TokenFound(CartToken),
    TokenMissing,
    InitSucceeded { transaction_id: String },
    /// The remote's purchase rate limit signal.
    InitRateLimited,
    InitRejected,
    PriceAccepted,
    PriceInsufficient,
    /// Price check refused by the remote or failed at the wire level.
    PriceRefused,
    FinalizeAccepted,
    /// Finalize refused by the remote or failed at the wire level.
    FinalizeRejected,
    PollStatus(TransactionCode),
    /// One poll round failed at the wire level. Consumes an attempt.
    PollErrored,
}

/// Transition rules for one checkout. Stateless apart from the fixed
/// payment method and poll budget it was built with.
pub struct CheckoutProtocol {
    method: PaymentMethod,
    max_poll_attempts: u32,
}

impl CheckoutProtocol {
    pub fn new(method: PaymentMethod, max_poll_attempts: u32) -> Self {
        Self {
            method,
            max_poll_attempts,
        }
    }

    /// Advance the machine by one event.
    pub fn transition(&self, state: State, event: Event) -> Result<State> {
        match (state, event) {
            // From AwaitingToken
            (State::AwaitingToken, Event::TokenFound(token)) => Ok(State::Initiating { token }),
            (State::AwaitingToken, Event::TokenMissing) => {
                Ok(done(CheckoutOutcome::CartTokenMissing, None))
            }

            // From Initiating
            (State::Initiating { token }, Event::InitSucceeded { transaction_id }) => {
                Ok(State::CheckingPrice {
                    token,
                    transaction_id,
                })
            }
            (State::Initiating { .. }, Event::InitRateLimited) => {
                Ok(done(CheckoutOutcome::TooManyPurchases, None))
            }
            (State::Initiating { .. }, Event::InitRejected) => {
                Ok(done(CheckoutOutcome::InitFailed, None))
            }

            // From CheckingPrice
            (State::CheckingPrice { transaction_id, .. }, Event::PriceAccepted) => {
                if self.method == PaymentMethod::Bitcoin {
                    // Nothing to finalize; the link is redeemed out of band.
                    Ok(done(
                        CheckoutOutcome::AwaitingExternalPayment,
                        Some(transaction_id),
                    ))
                } else {
                    Ok(State::Finalizing { transaction_id })
                }
            }
            (State::CheckingPrice { transaction_id, .. }, Event::PriceInsufficient) => Ok(done(
                CheckoutOutcome::InsufficientFunds,
                Some(transaction_id),
            )),
            (State::CheckingPrice { transaction_id, .. }, Event::PriceRefused) => {
                Ok(done(CheckoutOutcome::PriceCheckFailed, Some(transaction_id)))
            }

            // From Finalizing
            (State::Finalizing { transaction_id }, Event::FinalizeAccepted) => {
                if self.max_poll_attempts == 0 {
                    Ok(done(
                        CheckoutOutcome::PollBudgetExhausted,
                        Some(transaction_id),
                    ))
                } else {
                    Ok(State::Polling {
                        transaction_id,
                        attempts_used: 0,
                    })
                }
            }
            (State::Finalizing { transaction_id }, Event::FinalizeRejected) => {
                Ok(done(CheckoutOutcome::FinalizeFailed, Some(transaction_id)))
            }

            // From Polling
            (
                State::Polling {
                    transaction_id,
                    attempts_used,
                },
                Event::PollStatus(code),
            ) => {
                if code == TransactionCode::OK {
                    Ok(done(CheckoutOutcome::Purchased, Some(transaction_id)))
                } else if code == TransactionCode::PENDING {
                    Ok(self.consume_poll_attempt(transaction_id, attempts_used))
                } else {
                    Ok(done(
                        CheckoutOutcome::Declined { status: code.0 },
                        Some(transaction_id),
                    ))
                }
            }
            (
                State::Polling {
                    transaction_id,
                    attempts_used,
                },
                Event::PollErrored,
            ) => Ok(self.consume_poll_attempt(transaction_id, attempts_used)),

            // Everything else is a driver bug.
            (state, event) => Err(Error::Protocol(format!(
                "event {:?} is not valid in state {:?}",
                event, state
            ))),
        }
    }

    fn consume_poll_attempt(&self, transaction_id: String, attempts_used: u32) -> State {
        let attempts_used = attempts_used + 1;
        if attempts_used >= self.max_poll_attempts {
            done(
                CheckoutOutcome::PollBudgetExhausted,
                Some(transaction_id),
            )
        } else {
            State::Polling {
                transaction_id,
                attempts_used,
            }
        }
    }
}

fn done(outcome: CheckoutOutcome, transaction_id: Option<String>) -> State {
    State::Done {
        outcome,
        transaction_id,
    }
}
