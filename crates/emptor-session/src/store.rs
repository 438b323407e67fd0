//! HTTP session facade for the storefront.
//!
//! `Session` is the seam every orchestrator function is generic over;
//! `StoreSession` is the real implementation on reqwest. Responses fold
//! their `Set-Cookie` headers back into the state map before the body is
//! handed up, so the cart token the orchestrators read is always the one
//! the remote just assigned.

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use tracing::debug;

use emptor_core::{CartToken, Error, Result};

use crate::state::{SessionState, CART_TOKEN_COOKIE, SESSION_ID_COOKIE};

/// Present in the storefront header markup only when signed in.
const SIGNED_IN_MARKER: &str = "id=\"account_pulldown\"";

/// One HTTP exchange as the orchestrators see it.
///
/// Non-2xx statuses are data, not errors; the wire layer decides which
/// statuses are fatal for which call.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub body: String,
}

/// Authenticated storefront session.
///
/// Methods take `&mut self` because every exchange may rewrite cookie
/// state. One session belongs to exactly one account and is never shared;
/// the at-most-one-orchestration-per-account rule builds on that.
#[async_trait]
pub trait Session: Send {
    /// GET `path` (joined to the storefront origin) with a query string.
    async fn get(&mut self, path: &str, query: &[(&str, &str)]) -> Result<WireResponse>;

    /// POST `path` with a form-encoded body.
    async fn post_form(&mut self, path: &str, form: &[(&str, &str)]) -> Result<WireResponse>;

    /// Current cart token, if the storefront has assigned one. An empty
    /// cookie value counts as absent.
    fn current_cart_token(&self) -> Option<CartToken>;

    /// Drop the cart token so the next batch starts a fresh cart.
    fn clear_cart_token(&mut self);

    /// Anti-forgery token required in mutating form posts.
    fn session_id(&self) -> Option<String>;

    /// Account this session belongs to.
    fn account_name(&self) -> &str;
}

/// Real storefront session over reqwest.
#[derive(Debug)]
pub struct StoreSession {
    http: reqwest::Client,
    base_url: String,
    state: SessionState,
}

impl StoreSession {
    /// Build a session from provisioned state. `base_url` is the
    /// storefront origin without a trailing slash.
    pub fn new(base_url: impl Into<String>, state: SessionState) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            state,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn into_state(self) -> SessionState {
        self.state
    }

    /// Probe the store front page for the signed-in header.
    pub async fn is_logged_in(&mut self) -> Result<bool> {
        let response = self.get("/", &[]).await?;
        Ok(response.status == 200 && shows_signed_in_header(&response.body))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn cookie_header(&self) -> String {
        self.state
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn absorb_cookies(&mut self, response: &reqwest::Response) {
        for header in response.headers().get_all(SET_COOKIE) {
            if let Ok(raw) = header.to_str() {
                if let Some((name, value)) = parse_set_cookie(raw) {
                    if value.is_empty() {
                        self.state.cookies.remove(&name);
                    } else {
                        self.state.cookies.insert(name, value);
                    }
                }
            }
        }
    }

    async fn send(
        &mut self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<WireResponse> {
        let request = if self.state.cookies.is_empty() {
            request
        } else {
            request.header(COOKIE, self.cookie_header())
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("request to {} failed: {}", endpoint, e)))?;

        self.absorb_cookies(&response);
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("reading body from {} failed: {}", endpoint, e)))?;

        debug!(endpoint, status, bytes = body.len(), "storefront exchange");
        Ok(WireResponse { status, body })
    }
}

#[async_trait]
impl Session for StoreSession {
    async fn get(&mut self, path: &str, query: &[(&str, &str)]) -> Result<WireResponse> {
        let request = self.http.get(self.url(path)).query(query);
        self.send(request, path).await
    }

    async fn post_form(&mut self, path: &str, form: &[(&str, &str)]) -> Result<WireResponse> {
        let request = self.http.post(self.url(path)).form(form);
        self.send(request, path).await
    }

    fn current_cart_token(&self) -> Option<CartToken> {
        self.state
            .cookies
            .get(CART_TOKEN_COOKIE)
            .filter(|value| !value.is_empty())
            .map(|value| CartToken::new(value.clone()))
    }

    fn clear_cart_token(&mut self) {
        self.state.cookies.remove(CART_TOKEN_COOKIE);
    }

    fn session_id(&self) -> Option<String> {
        self.state
            .cookies
            .get(SESSION_ID_COOKIE)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    fn account_name(&self) -> &str {
        &self.state.account_name
    }
}

/// First `name=value` segment of a `Set-Cookie` header. Attributes after
/// the first `;` are ignored; this client only ever talks to the one
/// storefront host.
fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// True when the storefront header shows the signed-in account menu.
pub fn shows_signed_in_header(html: &str) -> bool {
    html.contains(SIGNED_IN_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_cookies(pairs: &[(&str, &str)]) -> StoreSession {
        let mut state = SessionState::new("alice");
        for (name, value) in pairs {
            state.cookies.insert(name.to_string(), value.to_string());
        }
        StoreSession::new("https://store.example.com", state).unwrap()
    }

    #[test]
    fn set_cookie_keeps_only_the_pair() {
        assert_eq!(
            parse_set_cookie("shoppingCartGID=7520942833; Path=/; Secure; HttpOnly"),
            Some(("shoppingCartGID".to_string(), "7520942833".to_string()))
        );
        assert_eq!(
            parse_set_cookie("sessionid=a1b2c3"),
            Some(("sessionid".to_string(), "a1b2c3".to_string()))
        );
        assert_eq!(
            parse_set_cookie("shoppingCartGID=; Max-Age=0"),
            Some(("shoppingCartGID".to_string(), String::new()))
        );
        assert_eq!(parse_set_cookie("no-equals-sign"), None);
        assert_eq!(parse_set_cookie("=orphan"), None);
    }

    #[test]
    fn cart_token_requires_a_nonempty_cookie() {
        let session = session_with_cookies(&[(CART_TOKEN_COOKIE, "7520942833")]);
        assert_eq!(
            session.current_cart_token(),
            Some(CartToken::new("7520942833"))
        );

        let session = session_with_cookies(&[(CART_TOKEN_COOKIE, "")]);
        assert_eq!(session.current_cart_token(), None);

        let session = session_with_cookies(&[]);
        assert_eq!(session.current_cart_token(), None);
    }

    #[test]
    fn clearing_the_token_removes_the_cookie() {
        let mut session = session_with_cookies(&[
            (CART_TOKEN_COOKIE, "7520942833"),
            (SESSION_ID_COOKIE, "a1b2c3"),
        ]);
        session.clear_cart_token();
        assert_eq!(session.current_cart_token(), None);
        assert_eq!(session.session_id(), Some("a1b2c3".to_string()));
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let session = session_with_cookies(&[("b", "2"), ("a", "1")]);
        // BTreeMap iteration gives a stable order.
        assert_eq!(session.cookie_header(), "a=1; b=2");
    }

    #[test]
    fn signed_in_marker_detection() {
        assert!(shows_signed_in_header(
            "<div id=\"account_pulldown\">alice</div>"
        ));
        assert!(!shows_signed_in_header(
            "<a href=\"https://store.example.com/login/\">Sign in</a>"
        ));
    }
}
