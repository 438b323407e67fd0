//! Cart state tracking.
//!
//! Classification around a mutating cart call never trusts the status
//! banner alone. The banner is remote-supplied text; the item count delta
//! between two snapshots must agree with it before an add or a removal
//! is believed.

use tracing::debug;

use emptor_core::{CartToken, Error, Result};
use emptor_session::Session;

use crate::snapshot::{parse_cart_page, CartSnapshot, ADDED_PHRASE, REMOVED_PHRASE};
use crate::wire::CART_PATH;

/// What a before/after snapshot pair says happened in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartDiff {
    pub item_was_added: bool,
    pub item_was_removed: bool,
}

/// Fetch and parse the current cart page. One request, one outcome;
/// failures are terminal for this call and never retried here.
pub async fn fetch_snapshot<S: Session>(session: &mut S) -> Result<CartSnapshot> {
    let response = session.get(CART_PATH, &[]).await?;
    if response.status != 200 {
        return Err(Error::UnexpectedStatus {
            endpoint: CART_PATH.to_string(),
            status: response.status,
        });
    }
    let snapshot = parse_cart_page(&response.body)?;
    debug!(
        items = snapshot.item_count,
        gifteable = snapshot.gift_checkout_available,
        "fetched cart snapshot"
    );
    Ok(snapshot)
}

/// Compare two snapshots taken around one mutating call. An add is only
/// believed when the added banner is up and the count grew; a removal
/// only when the removed banner is up and the count shrank.
pub fn diff(before: &CartSnapshot, after: &CartSnapshot) -> CartDiff {
    CartDiff {
        item_was_added: after.status_message == ADDED_PHRASE
            && after.item_count > before.item_count,
        item_was_removed: after.status_message == REMOVED_PHRASE
            && after.item_count < before.item_count,
    }
}

/// Whether the remote swapped carts between two observations of the
/// cart token cookie.
pub fn token_changed(before: Option<&CartToken>, after: Option<&CartToken>) -> bool {
    match (before, after) {
        (Some(before), Some(after)) => before != after,
        (None, None) => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::FakeSession;

    fn snapshot(item_count: u32, status_message: &str) -> CartSnapshot {
        CartSnapshot {
            item_count,
            items: Vec::new(),
            status_message: status_message.to_string(),
            gift_checkout_available: true,
        }
    }

    #[test]
    fn add_requires_banner_and_count_growth() {
        let before = snapshot(1, "");

        let grown = diff(&before, &snapshot(2, ADDED_PHRASE));
        assert!(grown.item_was_added);

        // Banner without growth is a lie the remote sometimes tells.
        let stale = diff(&before, &snapshot(1, ADDED_PHRASE));
        assert!(!stale.item_was_added);

        // Growth without the banner is some other page.
        let silent = diff(&before, &snapshot(2, ""));
        assert!(!silent.item_was_added);
    }

    #[test]
    fn removal_requires_banner_and_count_shrink() {
        let before = snapshot(2, "");

        let shrunk = diff(&before, &snapshot(1, REMOVED_PHRASE));
        assert!(shrunk.item_was_removed);
        assert!(!shrunk.item_was_added);

        let stale = diff(&before, &snapshot(2, REMOVED_PHRASE));
        assert!(!stale.item_was_removed);
    }

    #[test]
    fn token_change_detection() {
        let old = CartToken::new("111");
        let new = CartToken::new("222");

        assert!(!token_changed(Some(&old), Some(&old)));
        assert!(token_changed(Some(&old), Some(&new)));
        assert!(token_changed(Some(&old), None));
        assert!(token_changed(None, Some(&new)));
        assert!(!token_changed(None, None));
    }

    #[tokio::test]
    async fn fetch_snapshot_parses_the_cart_page() {
        let page = r#"<span id="cart_item_count_value">1</span>
            <div class="cart_row" data-package-id="100" data-lineitem-gid="gid-aa">
            <div class="price">$4.99</div></div>
            <a href="/checkout/?purchasetype=gift">Gift</a>"#;
        let mut session = FakeSession::new().expect("GET", CART_PATH, page);

        let snapshot = fetch_snapshot(&mut session).await.unwrap();
        assert_eq!(snapshot.item_count, 1);
        assert!(snapshot.contains_sub_id(100));
        assert_eq!(session.remaining(), 0);
    }

    #[tokio::test]
    async fn fetch_snapshot_rejects_non_ok_status() {
        let mut session = FakeSession::new().expect_status("GET", CART_PATH, 503, "down");

        let err = fetch_snapshot(&mut session).await.unwrap_err();
        match err {
            Error::UnexpectedStatus { status, .. } => assert_eq!(status, 503),
            other => panic!("expected status error, got {:?}", other),
        }
    }
}
