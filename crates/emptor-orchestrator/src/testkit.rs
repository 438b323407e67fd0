//! Test doubles shared by the orchestrator test modules.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use emptor_core::{CartToken, Error, Result};
use emptor_session::{Session, WireResponse};

use crate::checkout::Delay;

/// One scripted exchange.
struct Exchange {
    method: &'static str,
    path: &'static str,
    response: Result<WireResponse>,
    /// `None` leaves the cart token untouched. `Some(None)` drops the
    /// cookie, `Some(Some(token))` replaces it, as a Set-Cookie would.
    token_after: Option<Option<CartToken>>,
}

/// One observed call, with the form or query pairs that were sent.
pub struct CallRecord {
    pub method: String,
    pub path: String,
    pub form: Vec<(String, String)>,
}

/// Session double driven by a FIFO script of exchanges. Calls must
/// arrive in script order; anything else panics the test.
pub struct FakeSession {
    script: VecDeque<Exchange>,
    token: Option<CartToken>,
    pub calls: Vec<CallRecord>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            token: None,
            calls: Vec::new(),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(CartToken::new(token));
        self
    }

    /// Queue a 200 response.
    pub fn expect(self, method: &'static str, path: &'static str, body: &str) -> Self {
        self.expect_status(method, path, 200, body)
    }

    pub fn expect_status(
        mut self,
        method: &'static str,
        path: &'static str,
        status: u16,
        body: &str,
    ) -> Self {
        self.script.push_back(Exchange {
            method,
            path,
            response: Ok(WireResponse {
                status,
                body: body.to_string(),
            }),
            token_after: None,
        });
        self
    }

    /// Queue a transport failure.
    pub fn expect_transport_err(mut self, method: &'static str, path: &'static str) -> Self {
        self.script.push_back(Exchange {
            method,
            path,
            response: Err(Error::Transport("scripted connection failure".to_string())),
            token_after: None,
        });
        self
    }

    /// Queue an arbitrary error.
    pub fn script_error(&mut self, method: &'static str, path: &'static str, error: Error) {
        self.script.push_back(Exchange {
            method,
            path,
            response: Err(error),
            token_after: None,
        });
    }

    /// Make the most recently queued exchange set or drop the cart
    /// token, the way a Set-Cookie on that response would.
    pub fn then_token(mut self, token: Option<&str>) -> Self {
        if let Some(last) = self.script.back_mut() {
            last.token_after = Some(token.map(CartToken::new));
        }
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    /// Paths of every call made so far.
    pub fn called_paths(&self) -> Vec<&str> {
        self.calls.iter().map(|call| call.path.as_str()).collect()
    }

    fn play(&mut self, method: &str, path: &str, pairs: &[(&str, &str)]) -> Result<WireResponse> {
        self.calls.push(CallRecord {
            method: method.to_string(),
            path: path.to_string(),
            form: pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        });
        let exchange = self
            .script
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected call: {} {}", method, path));
        assert_eq!(
            (exchange.method, exchange.path),
            (method, path),
            "call out of script order"
        );
        if let Some(token) = exchange.token_after {
            self.token = token;
        }
        exchange.response
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn get(&mut self, path: &str, query: &[(&str, &str)]) -> Result<WireResponse> {
        self.play("GET", path, query)
    }

    async fn post_form(&mut self, path: &str, form: &[(&str, &str)]) -> Result<WireResponse> {
        self.play("POST", path, form)
    }

    fn current_cart_token(&self) -> Option<CartToken> {
        self.token.clone()
    }

    fn clear_cart_token(&mut self) {
        self.token = None;
    }

    fn session_id(&self) -> Option<String> {
        Some("sess-test".to_string())
    }

    fn account_name(&self) -> &str {
        "testacct"
    }
}

/// Delay double that returns immediately and records what it was asked
/// to sleep.
pub struct RecordingDelay {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self {
            slept: Mutex::new(Vec::new()),
        }
    }

    pub fn sleep_count(&self) -> usize {
        self.slept.lock().unwrap().len()
    }

    pub fn total_slept(&self) -> Duration {
        self.slept.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}
