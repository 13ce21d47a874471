//! Order details for the `list` action
//!
//! Listing needs only the storefront client: nothing is planned or fetched
//! to disk.

use tracing::warn;

use crate::app::client::{Session, StorefrontClient};
use crate::app::models::{OrderDetail, OrderKey};
use crate::app::signals::ShutdownSignal;

use super::stats::BatchFailure;

/// Order details gathered for display
#[derive(Debug, Default)]
pub struct Listing {
    pub orders: Vec<OrderDetail>,
    /// Orders whose detail could not be fetched
    pub failures: Vec<BatchFailure>,
}

/// Fetch every order detail in `order_keys`
///
/// Orders that fail to load are collected, not fatal. With `sort_by_date`
/// orders are sorted oldest first; orders without a date go last. Stops early
/// on shutdown and returns what it has.
pub async fn list_orders(
    client: &StorefrontClient,
    session: &Session,
    order_keys: Vec<OrderKey>,
    sort_by_date: bool,
    mut shutdown: ShutdownSignal,
) -> Listing {
    let mut listing = Listing::default();

    for order_key in order_keys {
        if shutdown.is_triggered() {
            break;
        }
        let fetched = tokio::select! {
            fetched = client.fetch_order_detail(session, &order_key) => fetched,
            _ = shutdown.triggered() => break,
        };
        match fetched {
            Ok(order) => listing.orders.push(order),
            Err(e) => {
                warn!("Order {} failed: {}", order_key, e);
                listing.failures.push(BatchFailure {
                    order_key,
                    file: None,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    if sort_by_date {
        sort_by_created(&mut listing.orders);
    }
    listing
}

/// Oldest first, undated orders last
fn sort_by_created(orders: &mut [OrderDetail]) {
    orders.sort_by_key(|order| (order.created.is_none(), order.created));
}
