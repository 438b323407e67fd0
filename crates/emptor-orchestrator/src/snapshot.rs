//! Cart page parsing.
//!
//! The storefront serves the cart as an HTML page and answers mutating
//! cart calls with the same page. Parsing is pure: [`parse_cart_page`]
//! turns one response body into an immutable [`CartSnapshot`], and
//! everything the orchestrators know about the cart flows through the
//! markers recognized here. A page without the item count marker is not
//! a cart page and fails to parse; every other marker is optional.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use emptor_core::{Error, Result};

/// Status banner the storefront shows after a successful add.
pub const ADDED_PHRASE: &str = "YOUR ITEM'S BEEN ADDED!";

/// Status banner the storefront shows after a successful removal.
pub const REMOVED_PHRASE: &str = "YOUR ITEM HAS BEEN REMOVED!";

/// One line item row from the cart page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Catalog package the row is for, as printed in `data-package-id`.
    pub product_ref: String,
    /// Opaque `data-lineitem-gid` the removal endpoint wants back.
    pub removal_token: String,
    /// Display price text, verbatim.
    pub price_text: String,
}

/// Immutable view of the cart as one page showed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    /// Authoritative item count from the header marker. Trusted over
    /// `items.len()`, which only counts rows that parsed cleanly.
    pub item_count: u32,
    pub items: Vec<CartLineItem>,
    /// Status banner text, empty when the page shows none.
    pub status_message: String,
    /// Whether the page offers a gift checkout entry point.
    pub gift_checkout_available: bool,
}

impl CartSnapshot {
    /// Line item row for a catalog package, if one is present.
    pub fn line_item(&self, sub_id: u64) -> Option<&CartLineItem> {
        let wanted = sub_id.to_string();
        self.items.iter().find(|item| item.product_ref == wanted)
    }

    /// Whether a line item for the package is present.
    pub fn contains_sub_id(&self, sub_id: u64) -> bool {
        self.line_item(sub_id).is_some()
    }
}

struct PageMarkers {
    item_count: Regex,
    status_message: Regex,
    cart_row: Regex,
    price: Regex,
    gift_checkout: Regex,
    wallet_balance: Regex,
}

static MARKERS: OnceLock<PageMarkers> = OnceLock::new();

fn markers() -> &'static PageMarkers {
    MARKERS.get_or_init(|| PageMarkers {
        item_count: Regex::new(r#"<span id="cart_item_count_value">([0-9]+)</span>"#)
            .expect("valid pattern"),
        status_message: Regex::new(r#"<div class="cart_status_message">\s*(.*?)\s*</div>"#)
            .expect("valid pattern"),
        cart_row: Regex::new(
            r#"<div class="cart_row"[^>]*\bdata-package-id="([^"]*)"[^>]*\bdata-lineitem-gid="([^"]*)"[^>]*>"#,
        )
        .expect("valid pattern"),
        price: Regex::new(r#"<div class="price">\s*([^<]*?)\s*</div>"#).expect("valid pattern"),
        gift_checkout: Regex::new(r#"<a[^>]+href="[^"]*purchasetype=gift[^"]*""#)
            .expect("valid pattern"),
        wallet_balance: Regex::new(r#"id="header_wallet_balance"[^>]*>\s*([^<]*?)\s*</a>"#)
            .expect("valid pattern"),
    })
}

/// Parse one cart page body into a snapshot.
pub fn parse_cart_page(html: &str) -> Result<CartSnapshot> {
    let markers = markers();

    let item_count = match markers.item_count.captures(html) {
        Some(caps) => caps[1]
            .parse::<u32>()
            .map_err(|e| Error::Parse(format!("cart item count out of range: {}", e)))?,
        None => {
            return Err(Error::Parse(
                "cart page is missing the item count marker".to_string(),
            ))
        }
    };

    let status_message = markers
        .status_message
        .captures(html)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();

    // Row starts carry the identifying attributes; the price sits in the
    // markup between one row start and the next.
    let row_starts: Vec<_> = markers.cart_row.captures_iter(html).collect();
    let mut items = Vec::with_capacity(row_starts.len());
    for (index, caps) in row_starts.iter().enumerate() {
        let product_ref = caps[1].trim().to_string();
        let removal_token = caps[2].trim().to_string();
        if product_ref.is_empty() || removal_token.is_empty() {
            continue;
        }
        let segment_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let segment_end = row_starts
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(html.len());
        let price_text = markers
            .price
            .captures(&html[segment_start..segment_end])
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();
        items.push(CartLineItem {
            product_ref,
            removal_token,
            price_text,
        });
    }

    Ok(CartSnapshot {
        item_count,
        items,
        status_message,
        gift_checkout_available: markers.gift_checkout.is_match(html),
    })
}

/// Wallet balance text from the store header, when the page renders one.
pub fn parse_wallet_balance(html: &str) -> Option<String> {
    markers()
        .wallet_balance
        .captures(html)
        .map(|caps| caps[1].to_string())
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart_row(package_id: &str, lineitem_gid: &str, price: &str) -> String {
        format!(
            r#"<div class="cart_row" data-package-id="{}" data-lineitem-gid="{}">
                <div class="item_name">Some Product</div>
                <div class="price"> {} </div>
            </div>"#,
            package_id, lineitem_gid, price
        )
    }

    fn cart_page(count: u32, rows: &[String], message: &str, gifteable: bool) -> String {
        let gift_link = if gifteable {
            r#"<a class="checkout_button" href="/checkout/?purchasetype=gift">Gift</a>"#
        } else {
            ""
        };
        let banner = if message.is_empty() {
            String::new()
        } else {
            format!(r#"<div class="cart_status_message"> {} </div>"#, message)
        };
        format!(
            r#"<html><body>
            <a id="header_wallet_balance" href="/account/"> $25.00 </a>
            {banner}
            <span id="cart_item_count_value">{count}</span>
            {rows}
            {gift_link}
            </body></html>"#,
            banner = banner,
            count = count,
            rows = rows.join("\n"),
            gift_link = gift_link,
        )
    }

    #[test]
    fn parses_a_full_cart_page() {
        let page = cart_page(
            2,
            &[
                cart_row("100", "gid-aa", "$4.99"),
                cart_row("200", "gid-bb", "$9.99"),
            ],
            ADDED_PHRASE,
            true,
        );

        let snapshot = parse_cart_page(&page).unwrap();
        assert_eq!(snapshot.item_count, 2);
        assert_eq!(snapshot.status_message, ADDED_PHRASE);
        assert!(snapshot.gift_checkout_available);
        assert_eq!(snapshot.items.len(), 2);
        assert_eq!(snapshot.items[0].product_ref, "100");
        assert_eq!(snapshot.items[0].removal_token, "gid-aa");
        assert_eq!(snapshot.items[0].price_text, "$4.99");
        assert!(snapshot.contains_sub_id(200));
        assert!(!snapshot.contains_sub_id(300));
    }

    #[test]
    fn parses_an_empty_cart() {
        let page = cart_page(0, &[], "", false);

        let snapshot = parse_cart_page(&page).unwrap();
        assert_eq!(snapshot.item_count, 0);
        assert!(snapshot.items.is_empty());
        assert_eq!(snapshot.status_message, "");
        assert!(!snapshot.gift_checkout_available);
    }

    #[test]
    fn missing_count_marker_fails_to_parse() {
        let err = parse_cart_page("<html><body>maintenance page</body></html>").unwrap_err();
        match err {
            Error::Parse(message) => assert!(message.contains("item count")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn rows_without_required_attributes_are_skipped() {
        let broken_row = r#"<div class="cart_row" data-package-id="300">
            <div class="price">$1.99</div></div>"#
            .to_string();
        let empty_attr_row = cart_row("", "gid-cc", "$2.99");
        let page = cart_page(
            3,
            &[broken_row, empty_attr_row, cart_row("100", "gid-aa", "$4.99")],
            "",
            true,
        );

        let snapshot = parse_cart_page(&page).unwrap();
        // The header count is authoritative even when rows do not parse.
        assert_eq!(snapshot.item_count, 3);
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].product_ref, "100");
    }

    #[test]
    fn price_is_taken_from_the_matching_row_segment() {
        let page = cart_page(
            2,
            &[
                cart_row("100", "gid-aa", "$4.99"),
                cart_row("200", "gid-bb", "$9.99"),
            ],
            "",
            true,
        );

        let snapshot = parse_cart_page(&page).unwrap();
        assert_eq!(snapshot.items[1].price_text, "$9.99");
    }

    #[test]
    fn wallet_balance_comes_from_the_header_marker() {
        let page = cart_page(0, &[], "", false);
        assert_eq!(parse_wallet_balance(&page).as_deref(), Some("$25.00"));
        assert_eq!(parse_wallet_balance("<html></html>"), None);
    }
}
