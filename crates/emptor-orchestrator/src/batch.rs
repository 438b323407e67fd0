//! Add-item orchestration.
//!
//! One batch walks its items in order against a remote cart that may be
//! silently replaced at any point. Each add is judged against a baseline
//! snapshot, never against the status banner alone, and a cart token
//! change retroactively invalidates every success accumulated under the
//! old token. Per-item failures never abort the batch; the only errors
//! out of here are non-wire ones, plus a failure to take the very first
//! baseline.

use tracing::{debug, info, warn};

use emptor_core::{AddItemOutcome, BatchItem, BatchResult, CartToken, Result};
use emptor_session::Session;

use crate::snapshot::{parse_cart_page, CartSnapshot};
use crate::tracker::{self, token_changed};
use crate::wire;

/// Add every item in order, reconciling cart resets as they are
/// discovered.
pub async fn add_batch<S: Session>(session: &mut S, items: &[BatchItem]) -> Result<BatchResult> {
    let mut result = BatchResult::default();

    // Nothing has been mutated yet, so a failure here fails the call.
    let mut baseline = tracker::fetch_snapshot(session).await?;
    info!(
        account = session.account_name(),
        items = items.len(),
        cart_items = baseline.item_count,
        "starting add batch"
    );

    for item in items {
        let token_before = session.current_cart_token();

        let body = match wire::add_to_cart(session, item.sub_id).await {
            Ok(body) => body,
            Err(e) if e.is_wire_failure() => {
                // Neither list gets the item; it is visible only here.
                warn!(sub_id = item.sub_id, error = %e, "add request failed, skipping item");
                continue;
            }
            Err(e) => return Err(e),
        };

        let (outcome, fresh) =
            match classify(session, &baseline, &body, token_before.as_ref()).await {
                Ok(classified) => classified,
                Err(e) if e.is_wire_failure() => {
                    warn!(sub_id = item.sub_id, error = %e, "could not judge the add, skipping item");
                    continue;
                }
                Err(e) => return Err(e),
            };

        debug!(sub_id = item.sub_id, outcome = ?outcome, "classified add attempt");

        match outcome {
            AddItemOutcome::Added => {
                result.succeeded_items.push(item.clone());
                baseline = fresh;
            }
            AddItemOutcome::CartNotGifteable => {
                result.failed_items.push(item.clone());
                baseline = remove_last_added(session, fresh, item.sub_id).await;
            }
            AddItemOutcome::Failed => {
                // Same cart, same count: the remote swallowed the add.
                // The item lands on neither list.
                baseline = fresh;
            }
            AddItemOutcome::CartDisappeared => {
                invalidate(token_before, &mut result);
                baseline = fresh;
            }
            AddItemOutcome::CartReset => {
                invalidate(token_before, &mut result);
                if fresh.contains_sub_id(item.sub_id) {
                    // The add itself landed in the replacement cart.
                    result.succeeded_items.push(item.clone());
                }
                baseline = fresh;
            }
        }
    }

    result.final_cart_token = session.current_cart_token();
    info!(
        succeeded = result.succeeded_items.len(),
        failed = result.failed_items.len(),
        invalidated_tokens = result.invalidated_cart_tokens.len(),
        "add batch finished"
    );
    Ok(result)
}

/// Judge one add attempt. The response body is read as a cart page first;
/// when it does not show a grown cart, the cart is fetched again and the
/// token comparison decides between a plain failure, a reset and a
/// disappearance.
async fn classify<S: Session>(
    session: &mut S,
    baseline: &CartSnapshot,
    add_body: &str,
    token_before: Option<&CartToken>,
) -> Result<(AddItemOutcome, CartSnapshot)> {
    let after = parse_cart_page(add_body)?;
    let diff = tracker::diff(baseline, &after);
    if diff.item_was_added {
        if !after.gift_checkout_available {
            return Ok((AddItemOutcome::CartNotGifteable, after));
        }
        return Ok((AddItemOutcome::Added, after));
    }

    // The response did not read as a grown cart. Look again before
    // deciding what happened.
    let fresh = tracker::fetch_snapshot(session).await?;
    let current = session.current_cart_token();
    let outcome = if current.is_none() {
        AddItemOutcome::CartDisappeared
    } else if token_changed(token_before, current.as_ref()) {
        AddItemOutcome::CartReset
    } else {
        AddItemOutcome::Failed
    };
    Ok((outcome, fresh))
}

/// Move every accumulated success under the old token to the failed
/// list and record the token as invalidated.
fn invalidate(token_before: Option<CartToken>, result: &mut BatchResult) {
    if let Some(token) = token_before {
        if !result.succeeded_items.is_empty() {
            warn!(
                token = %token,
                invalidated = result.succeeded_items.len(),
                "cart token invalidated, prior successes moved to failed"
            );
        }
        result.failed_items.append(&mut result.succeeded_items);
        result.invalidated_cart_tokens.insert(token);
    }
}

/// Best-effort compensating removal after an add left the cart
/// non-gifteable. The batch proceeds whatever happens here; a failed
/// removal only costs log lines. Returns the snapshot to carry forward
/// as the new baseline.
async fn remove_last_added<S: Session>(
    session: &mut S,
    fresh: CartSnapshot,
    sub_id: u64,
) -> CartSnapshot {
    let token = match session.current_cart_token() {
        Some(token) => token,
        None => {
            warn!(sub_id, "no cart token for the compensating removal");
            return fresh;
        }
    };
    let removal_token = match fresh.line_item(sub_id) {
        Some(line) => line.removal_token.clone(),
        None => {
            warn!(sub_id, "line item not found for the compensating removal");
            return fresh;
        }
    };

    match wire::remove_line_item(session, &token, &removal_token).await {
        Ok(body) => match parse_cart_page(&body) {
            Ok(after) => {
                if tracker::diff(&fresh, &after).item_was_removed {
                    debug!(sub_id, "compensating removal confirmed");
                } else {
                    warn!(sub_id, "compensating removal not confirmed by the cart page");
                }
                after
            }
            Err(e) => {
                warn!(sub_id, error = %e, "compensating removal returned an unreadable page");
                match tracker::fetch_snapshot(session).await {
                    Ok(snapshot) => snapshot,
                    Err(refetch) => {
                        warn!(sub_id, error = %refetch, "could not re-fetch after the removal");
                        fresh
                    }
                }
            }
        },
        Err(e) => {
            warn!(sub_id, error = %e, "compensating removal failed");
            fresh
        }
    }
}
