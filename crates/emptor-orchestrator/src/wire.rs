//! Typed storefront endpoint calls.
//!
//! One function per endpoint, each a single exchange over the `Session`
//! seam. Success codes arrive as JSON bools or numbers depending on the
//! endpoint and the day, so they decode through [`TransactionCode`].
//! Decode failures surface as `Error::Parse` to keep a contract change
//! distinguishable from the remote being down.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use emptor_core::{BotConfig, CartToken, CheckoutRequest, Error, Result};
use emptor_session::{Session, WireResponse};

pub(crate) const CART_PATH: &str = "/cart/";
pub(crate) const GIFT_CHECKOUT_PATH: &str = "/checkout/";
pub(crate) const INIT_TRANSACTION_PATH: &str = "/checkout/inittransaction/";
pub(crate) const FINAL_PRICE_PATH: &str = "/checkout/getfinalprice/";
pub(crate) const FINALIZE_PATH: &str = "/checkout/finalizetransaction/";
pub(crate) const TRANSACTION_STATUS_PATH: &str = "/checkout/transactionstatus/";
pub(crate) const EXTERNAL_LINK_PATH: &str = "/checkout/externallink/";

/// Transaction status code as the storefront reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionCode(pub i64);

impl TransactionCode {
    /// Transaction settled.
    pub const OK: TransactionCode = TransactionCode(1);
    /// Transaction open and progressing.
    pub const PENDING: TransactionCode = TransactionCode(22);
}

impl<'de> Deserialize<'de> for TransactionCode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Bool(flag) => Ok(TransactionCode(if flag { 1 } else { 0 })),
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(TransactionCode)
                .ok_or_else(|| serde::de::Error::custom("success code is not an integer")),
            other => Err(serde::de::Error::custom(format!(
                "success code has unexpected type: {}",
                other
            ))),
        }
    }
}

/// Amounts come back as integer cents, but occasionally as numeric
/// strings. Either form decodes; anything else is a parse failure.
fn deserialize_cents<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(number)) => number
            .as_i64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("amount is not an integer")),
        Some(serde_json::Value::String(text)) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("amount is not numeric: {}", e))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "amount has unexpected type: {}",
            other
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct InitTransactionBody {
    success: TransactionCode,
    #[serde(default)]
    transid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FinalPriceBody {
    success: TransactionCode,
    #[serde(default, deserialize_with = "deserialize_cents")]
    total: Option<i64>,
    #[serde(
        default,
        rename = "accountBalance",
        deserialize_with = "deserialize_cents"
    )]
    account_balance: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    success: TransactionCode,
}

/// Result of init-transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Started { transaction_id: String },
    /// The remote's purchase rate limit signal: `transid == "-1"`.
    RateLimited,
    /// Refused outright, or no transaction id came back.
    Rejected,
}

/// Quoted price for an initialized transaction, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub total: i64,
    /// Wallet balance, when the storefront included one in the quote.
    pub account_balance: Option<i64>,
}

fn require_session_id<S: Session>(session: &S) -> Result<String> {
    session
        .session_id()
        .ok_or_else(|| Error::NotLoggedIn(session.account_name().to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(endpoint: &str, response: &WireResponse) -> Result<T> {
    if response.status != 200 {
        return Err(Error::UnexpectedStatus {
            endpoint: endpoint.to_string(),
            status: response.status,
        });
    }
    serde_json::from_str(&response.body)
        .map_err(|e| Error::Parse(format!("{} body: {}", endpoint, e)))
}

/// Add one catalog package to the cart. Returns the raw cart page body;
/// the caller interprets it against its baseline snapshot.
pub async fn add_to_cart<S: Session>(session: &mut S, sub_id: u64) -> Result<String> {
    let session_id = require_session_id(session)?;
    let sub_id = sub_id.to_string();
    let form = [
        ("sessionid", session_id.as_str()),
        ("action", "add_to_cart"),
        ("subid", sub_id.as_str()),
    ];
    let response = session.post_form(CART_PATH, &form).await?;
    if response.status != 200 {
        return Err(Error::UnexpectedStatus {
            endpoint: CART_PATH.to_string(),
            status: response.status,
        });
    }
    Ok(response.body)
}

/// Remove one line item from the cart. Returns the raw cart page body so
/// the caller can confirm the removal against its snapshot.
pub async fn remove_line_item<S: Session>(
    session: &mut S,
    cart_token: &CartToken,
    removal_token: &str,
) -> Result<String> {
    let session_id = require_session_id(session)?;
    let form = [
        ("sessionid", session_id.as_str()),
        ("action", "remove_line_item"),
        ("cart", cart_token.as_str()),
        ("lineitem_gid", removal_token),
    ];
    let response = session.post_form(CART_PATH, &form).await?;
    if response.status != 200 {
        return Err(Error::UnexpectedStatus {
            endpoint: CART_PATH.to_string(),
            status: response.status,
        });
    }
    Ok(response.body)
}

/// Best-effort GET of the gift checkout page before init-transaction.
/// The storefront primes server-side checkout state from this view; its
/// failure never blocks the flow.
pub async fn checkout_warmup<S: Session>(session: &mut S) {
    if let Err(e) = session.get(GIFT_CHECKOUT_PATH, &[("purchasetype", "gift")]).await {
        debug!(error = %e, "checkout warmup skipped");
    }
}

/// Open a gift transaction for the current cart.
pub async fn init_transaction<S: Session>(
    session: &mut S,
    cart_token: &CartToken,
    request: &CheckoutRequest,
    config: &BotConfig,
) -> Result<InitOutcome> {
    let session_id = require_session_id(session)?;
    let giftee_account_id = request.giftee_account_id.to_string();
    let billing = &config.billing;
    let form = [
        ("gidShoppingCart", cart_token.as_str()),
        ("gidReplayOfTransID", "-1"),
        ("PaymentMethod", request.payment_method.wire_name()),
        ("abortPendingTransactions", "0"),
        ("bHasCardInfo", "0"),
        ("CardNumber", ""),
        ("CardExpirationYear", ""),
        ("CardExpirationMonth", ""),
        ("FirstName", billing.first_name.as_str()),
        ("LastName", billing.last_name.as_str()),
        ("Address", billing.address.as_str()),
        ("AddressTwo", ""),
        ("Country", config.store.country.as_str()),
        ("City", billing.city.as_str()),
        ("State", billing.state.as_str()),
        ("PostalCode", billing.postal_code.as_str()),
        ("Phone", billing.phone.as_str()),
        ("ShippingFirstName", ""),
        ("ShippingLastName", ""),
        ("ShippingAddress", ""),
        ("ShippingAddressTwo", ""),
        ("ShippingCountry", ""),
        ("ShippingCity", ""),
        ("ShippingState", ""),
        ("ShippingPostalCode", ""),
        ("ShippingPhone", ""),
        ("bIsGift", "1"),
        ("GifteeAccountID", giftee_account_id.as_str()),
        ("GifteeEmail", ""),
        ("GifteeName", ""),
        ("GiftMessage", config.checkout.gift_message.as_str()),
        ("Sentiment", "Best Wishes"),
        ("Signature", config.checkout.gift_signature.as_str()),
        ("ScheduledSendOnDate", "0"),
        ("BankAccount", ""),
        ("BankCode", ""),
        ("BankIBAN", ""),
        ("BankBIC", ""),
        ("bSaveBillingAddress", "1"),
        ("gidPaymentID", ""),
        ("bUseRemainingAccountBalance", "1"),
        ("bPreAuthOnly", "0"),
        ("sessionid", session_id.as_str()),
    ];

    let response = session.post_form(INIT_TRANSACTION_PATH, &form).await?;
    let body: InitTransactionBody = decode(INIT_TRANSACTION_PATH, &response)?;

    // The rate limit signal outranks the success flag.
    if body.transid.as_deref() == Some("-1") {
        return Ok(InitOutcome::RateLimited);
    }
    if body.success != TransactionCode::OK {
        warn!(code = body.success.0, "init transaction refused");
        return Ok(InitOutcome::Rejected);
    }
    match body.transid {
        Some(transaction_id) if !transaction_id.is_empty() => {
            Ok(InitOutcome::Started { transaction_id })
        }
        _ => Ok(InitOutcome::Rejected),
    }
}

/// Price check for an open transaction. `Ok(None)` means the remote
/// answered but refused to quote.
pub async fn final_price<S: Session>(
    session: &mut S,
    cart_token: &CartToken,
    transaction_id: &str,
) -> Result<Option<PriceQuote>> {
    let query = [
        ("count", "1"),
        ("transid", transaction_id),
        ("purchasetype", "gift"),
        ("microtxnid", "-1"),
        ("cart", cart_token.as_str()),
        ("gidReplayOfTransID", "-1"),
    ];
    let response = session.get(FINAL_PRICE_PATH, &query).await?;
    let body: FinalPriceBody = decode(FINAL_PRICE_PATH, &response)?;
    if body.success != TransactionCode::OK {
        return Ok(None);
    }
    match body.total {
        Some(total) => Ok(Some(PriceQuote {
            total,
            account_balance: body.account_balance,
        })),
        None => Err(Error::Parse(format!(
            "{} body is missing the total",
            FINAL_PRICE_PATH
        ))),
    }
}

/// Commit an open transaction. Returns the reported status code; the
/// caller decides what the code means for the flow.
pub async fn finalize_transaction<S: Session>(
    session: &mut S,
    transaction_id: &str,
) -> Result<TransactionCode> {
    let form = [("transid", transaction_id), ("CardCVV2", "")];
    let response = session.post_form(FINALIZE_PATH, &form).await?;
    let body: StatusBody = decode(FINALIZE_PATH, &response)?;
    Ok(body.success)
}

/// One status poll for an open transaction.
pub async fn transaction_status<S: Session>(
    session: &mut S,
    transaction_id: &str,
) -> Result<TransactionCode> {
    let query = [("count", "1"), ("transid", transaction_id)];
    let response = session.get(TRANSACTION_STATUS_PATH, &query).await?;
    let body: StatusBody = decode(TRANSACTION_STATUS_PATH, &response)?;
    Ok(body.success)
}

/// Payment redirect target for an externally funded transaction.
pub async fn external_payment_link<S: Session>(
    session: &mut S,
    transaction_id: &str,
) -> Result<String> {
    let response = session
        .get(EXTERNAL_LINK_PATH, &[("transid", transaction_id)])
        .await?;
    if response.status != 200 {
        return Err(Error::UnexpectedStatus {
            endpoint: EXTERNAL_LINK_PATH.to_string(),
            status: response.status,
        });
    }
    extract_payment_link(&response.body).ok_or_else(|| {
        Error::Parse(format!(
            "{} body has no payment form target",
            EXTERNAL_LINK_PATH
        ))
    })
}

fn extract_payment_link(html: &str) -> Option<String> {
    static LINK: OnceLock<Regex> = OnceLock::new();
    let link = LINK.get_or_init(|| Regex::new(r#"action="(https://[^"]+)""#).expect("valid pattern"));
    link.captures(html).map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakeSession;
    use emptor_core::{BillingProfile, PaymentMethod};

    fn config() -> BotConfig {
        let mut config = BotConfig::default();
        config.billing = BillingProfile {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            address: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            postal_code: "62701".to_string(),
            phone: "5551234567".to_string(),
        };
        config
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            giftee_account_id: 76561,
            payment_method: PaymentMethod::AccountBalance,
        }
    }

    #[tokio::test]
    async fn init_transaction_started() {
        let mut session = FakeSession::new()
            .expect("POST", INIT_TRANSACTION_PATH, r#"{"success":1,"transid":"9001"}"#);
        let token = CartToken::new("cart-1");

        let outcome = init_transaction(&mut session, &token, &request(), &config())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            InitOutcome::Started {
                transaction_id: "9001".to_string()
            }
        );

        let form = &session.calls[0].form;
        let field = |name: &str| {
            form.iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };
        assert_eq!(field("gidShoppingCart"), Some("cart-1"));
        assert_eq!(field("PaymentMethod"), Some("account"));
        assert_eq!(field("bIsGift"), Some("1"));
        assert_eq!(field("GifteeAccountID"), Some("76561"));
        assert_eq!(field("gidReplayOfTransID"), Some("-1"));
        assert_eq!(field("FirstName"), Some("Jane"));
        assert_eq!(field("Country"), Some("US"));
    }

    #[tokio::test]
    async fn init_transaction_rate_limit_outranks_success() {
        let mut session = FakeSession::new()
            .expect("POST", INIT_TRANSACTION_PATH, r#"{"success":1,"transid":"-1"}"#);
        let token = CartToken::new("cart-1");

        let outcome = init_transaction(&mut session, &token, &request(), &config())
            .await
            .unwrap();
        assert_eq!(outcome, InitOutcome::RateLimited);
    }

    #[tokio::test]
    async fn init_transaction_rejected_without_transid() {
        let mut session =
            FakeSession::new().expect("POST", INIT_TRANSACTION_PATH, r#"{"success":2}"#);
        let token = CartToken::new("cart-1");

        let outcome = init_transaction(&mut session, &token, &request(), &config())
            .await
            .unwrap();
        assert_eq!(outcome, InitOutcome::Rejected);
    }

    #[tokio::test]
    async fn success_codes_decode_from_bools_and_numbers() {
        let mut session = FakeSession::new()
            .expect("POST", INIT_TRANSACTION_PATH, r#"{"success":true,"transid":"77"}"#);
        let token = CartToken::new("cart-1");

        let outcome = init_transaction(&mut session, &token, &request(), &config())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            InitOutcome::Started {
                transaction_id: "77".to_string()
            }
        );
    }

    #[tokio::test]
    async fn final_price_quotes_in_cents() {
        let mut session = FakeSession::new().expect(
            "GET",
            FINAL_PRICE_PATH,
            r#"{"success":1,"total":499,"accountBalance":"1250"}"#,
        );
        let token = CartToken::new("cart-1");

        let quote = final_price(&mut session, &token, "9001").await.unwrap();
        assert_eq!(
            quote,
            Some(PriceQuote {
                total: 499,
                account_balance: Some(1250),
            })
        );
    }

    #[tokio::test]
    async fn final_price_refusal_is_not_an_error() {
        let mut session =
            FakeSession::new().expect("GET", FINAL_PRICE_PATH, r#"{"success":2}"#);
        let token = CartToken::new("cart-1");

        let quote = final_price(&mut session, &token, "9001").await.unwrap();
        assert_eq!(quote, None);
    }

    #[tokio::test]
    async fn final_price_without_total_is_a_parse_failure() {
        let mut session =
            FakeSession::new().expect("GET", FINAL_PRICE_PATH, r#"{"success":1}"#);
        let token = CartToken::new("cart-1");

        let err = final_price(&mut session, &token, "9001").await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn transaction_status_maps_http_and_body_failures() {
        let mut session = FakeSession::new()
            .expect_status("GET", TRANSACTION_STATUS_PATH, 502, "bad gateway");
        let err = transaction_status(&mut session, "9001").await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { status: 502, .. }));

        let mut session =
            FakeSession::new().expect("GET", TRANSACTION_STATUS_PATH, "<html>not json</html>");
        let err = transaction_status(&mut session, "9001").await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn add_to_cart_posts_the_package() {
        let page = r#"<span id="cart_item_count_value">1</span>"#;
        let mut session = FakeSession::new().expect("POST", CART_PATH, page);

        let body = add_to_cart(&mut session, 4242).await.unwrap();
        assert!(body.contains("cart_item_count_value"));

        let form = &session.calls[0].form;
        assert!(form.contains(&("action".to_string(), "add_to_cart".to_string())));
        assert!(form.contains(&("subid".to_string(), "4242".to_string())));
        assert!(form.contains(&("sessionid".to_string(), "sess-test".to_string())));
    }

    #[tokio::test]
    async fn external_payment_link_extracts_the_form_target() {
        let html = r#"<form method="POST" action="https://pay.example.com/invoice/abc123">"#;
        let mut session = FakeSession::new().expect("GET", EXTERNAL_LINK_PATH, html);

        let link = external_payment_link(&mut session, "9001").await.unwrap();
        assert_eq!(link, "https://pay.example.com/invoice/abc123");

        let mut session = FakeSession::new().expect("GET", EXTERNAL_LINK_PATH, "<html></html>");
        let err = external_payment_link(&mut session, "9001").await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
