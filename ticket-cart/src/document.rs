//! Remote cart document: the per-user record shared by all of a user's sessions.
//!
//! The wire shape is camelCase JSON. Only the line identity, price and
//! quantity are required on read; every other field falls back to a default
//! so documents written by older clients still load.

use crate::cart::{CartLineItem, LocalCart};
use crate::types::{EventId, Money, TierId};
use cart_sync_core::document_store::ServerTimestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A line item as stored in the remote document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLineItem {
    /// Event the tickets are for
    pub event_id: EventId,
    /// Event title
    #[serde(default)]
    pub event_title: String,
    /// Event date
    #[serde(default)]
    pub event_date: String,
    /// Event image URL
    #[serde(default)]
    pub event_image: Option<String>,
    /// Venue name
    #[serde(default)]
    pub venue: Option<String>,
    /// Ticket tier within the event
    pub tier_id: TierId,
    /// Tier name
    #[serde(default)]
    pub tier_name: String,
    /// Unit price
    pub price: Money,
    /// Number of tickets
    pub quantity: u32,
    /// When the line was added, if recorded
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
    /// Price before a detected price change
    #[serde(default)]
    pub original_price: Option<Money>,
}

impl RemoteLineItem {
    /// Converts to a local line, stamping `now` when `added_at` is missing
    #[must_use]
    pub fn into_line_item(self, now: DateTime<Utc>) -> CartLineItem {
        CartLineItem {
            event_id: self.event_id,
            event_title: self.event_title,
            event_date: self.event_date,
            event_image: self.event_image,
            venue: self.venue,
            tier_id: self.tier_id,
            tier_name: self.tier_name,
            price: self.price,
            quantity: self.quantity,
            added_at: self.added_at.unwrap_or(now),
            original_price: self.original_price,
        }
    }
}

impl From<&CartLineItem> for RemoteLineItem {
    fn from(item: &CartLineItem) -> Self {
        Self {
            event_id: item.event_id.clone(),
            event_title: item.event_title.clone(),
            event_date: item.event_date.clone(),
            event_image: item.event_image.clone(),
            venue: item.venue.clone(),
            tier_id: item.tier_id.clone(),
            tier_name: item.tier_name.clone(),
            price: item.price,
            quantity: item.quantity,
            added_at: Some(item.added_at),
            original_price: item.original_price,
        }
    }
}

/// The persisted cart of one user
///
/// ```
/// use ticket_cart::CartDocument;
///
/// let document: CartDocument = serde_json::from_str(r#"{
///     "items": [{ "eventId": "evt-1", "tierId": "ga", "price": 2500, "quantity": 2 }],
///     "promoCode": null
/// }"#).unwrap();
///
/// assert_eq!(document.items.len(), 1);
/// assert!(document.items[0].added_at.is_none());
/// assert!(document.updated_at.is_none());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartDocument {
    /// Lines in cart order
    #[serde(default)]
    pub items: Vec<RemoteLineItem>,
    /// Applied promo code
    #[serde(default)]
    pub promo_code: Option<String>,
    /// Discount granted by the promo code
    #[serde(default)]
    pub discount: Option<Money>,
    /// Tax amount
    #[serde(default)]
    pub tax: Option<Money>,
    /// Amount due
    #[serde(default)]
    pub final_total: Option<Money>,
    /// Last write time, assigned by the store
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartDocument {
    /// Builds the full-replace document for the current local cart
    ///
    /// Every amount is written, zero when there is nothing to report. The
    /// discount is the promo's full value; only the totals cap it. The
    /// timestamp is left for the store to assign.
    #[must_use]
    pub fn from_cart(cart: &LocalCart) -> Self {
        let totals = cart.totals();
        Self {
            items: cart.items().iter().map(RemoteLineItem::from).collect(),
            promo_code: cart.promo_code().map(str::to_string),
            discount: Some(cart.discount()),
            tax: Some(totals.tax),
            final_total: Some(totals.final_total),
            updated_at: None,
        }
    }

    /// Discount carried by the document, zero when absent
    #[must_use]
    pub fn discount_or_zero(&self) -> Money {
        self.discount.unwrap_or_default()
    }

    /// Whether the document carries a promo code or a nonzero discount
    #[must_use]
    pub fn has_promotion(&self) -> bool {
        self.promo_code.as_deref().is_some_and(|code| !code.is_empty())
            || !self.discount_or_zero().is_zero()
    }
}

impl ServerTimestamp for CartDocument {
    fn set_server_timestamp(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cart_sync_core::environment::Clock;
    use cart_sync_testing::test_clock;
    use serde_json::json;

    #[test]
    fn writes_camel_case_with_explicit_nulls_and_zeros() {
        let mut cart = LocalCart::default();
        cart.add_item(
            CartLineItem::new("evt-1", "ga", Money::from_minor(2_500), 2, test_clock().now())
                .with_event("Jazz Night", "2025-03-01")
                .with_tier_name("General"),
        );

        let value = serde_json::to_value(CartDocument::from_cart(&cart)).unwrap_or_default();

        assert_eq!(value["promoCode"], json!(null));
        assert_eq!(value["discount"], json!(0));
        assert_eq!(value["tax"], json!(0));
        assert_eq!(value["finalTotal"], json!(5_000));
        assert_eq!(value["items"][0]["eventId"], json!("evt-1"));
        assert_eq!(value["items"][0]["tierName"], json!("General"));
        assert_eq!(value["items"][0]["addedAt"], json!("2025-01-01T00:00:00Z"));
        assert_eq!(value["items"][0]["originalPrice"], json!(null));
    }

    #[test]
    fn writes_full_promo_discount_even_above_subtotal() {
        let mut cart = LocalCart::default();
        cart.add_item(CartLineItem::new("evt-1", "ga", Money::from_minor(500), 1, test_clock().now()));
        cart.set_promo_code("SAVE10", Money::from_minor(1_000));

        let document = CartDocument::from_cart(&cart);

        assert_eq!(document.discount, Some(Money::from_minor(1_000)));
        assert_eq!(document.final_total, Some(Money::ZERO));
    }

    #[test]
    fn missing_added_at_defaults_to_now() {
        let remote: RemoteLineItem = serde_json::from_value(json!({
            "eventId": "evt-1",
            "tierId": "ga",
            "price": 100,
            "quantity": 1
        }))
        .unwrap_or_else(|e| unreachable!("valid item: {e}"));

        let now = test_clock().now();
        let item = remote.into_line_item(now);
        assert_eq!(item.added_at, now);
        assert_eq!(item.event_title, "");
        assert_eq!(item.original_price, None);
    }

    #[test]
    fn promotion_detection() {
        let mut document = CartDocument::default();
        assert!(!document.has_promotion());

        document.promo_code = Some(String::new());
        assert!(!document.has_promotion());

        document.discount = Some(Money::from_minor(50));
        assert!(document.has_promotion());
    }

    #[test]
    fn store_assigns_timestamp() {
        let mut document = CartDocument::default();
        document.set_server_timestamp(test_clock().now());
        assert_eq!(document.updated_at, Some(test_clock().now()));
    }
}
