//! Local cart: the in-memory working copy of the user's cart.
//!
//! The cart keeps one line per `(event, tier)` pair. Totals are derived from
//! the lines, the promo discount and the configured tax rate, never stored.

use crate::types::{EventId, LineKey, Money, TierId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One selected ticket tier for one event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Event the tickets are for
    pub event_id: EventId,
    /// Event title for display
    pub event_title: String,
    /// Event date as published by the catalog
    pub event_date: String,
    /// Event image URL
    pub event_image: Option<String>,
    /// Venue name
    pub venue: Option<String>,
    /// Ticket tier within the event
    pub tier_id: TierId,
    /// Tier name for display
    pub tier_name: String,
    /// Unit price
    pub price: Money,
    /// Number of tickets
    pub quantity: u32,
    /// When the line was first added to the cart
    pub added_at: DateTime<Utc>,
    /// Price the user saw before a remote price change
    pub original_price: Option<Money>,
}

impl CartLineItem {
    /// Creates a line item with empty display fields
    #[must_use]
    pub fn new(
        event_id: impl Into<EventId>,
        tier_id: impl Into<TierId>,
        price: Money,
        quantity: u32,
        added_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_title: String::new(),
            event_date: String::new(),
            event_image: None,
            venue: None,
            tier_id: tier_id.into(),
            tier_name: String::new(),
            price,
            quantity,
            added_at,
            original_price: None,
        }
    }

    /// Sets the event title and date
    #[must_use]
    pub fn with_event(mut self, title: impl Into<String>, date: impl Into<String>) -> Self {
        self.event_title = title.into();
        self.event_date = date.into();
        self
    }

    /// Sets the tier name
    #[must_use]
    pub fn with_tier_name(mut self, name: impl Into<String>) -> Self {
        self.tier_name = name.into();
        self
    }

    /// Sets the venue
    #[must_use]
    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    /// Sets the event image URL
    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.event_image = Some(url.into());
        self
    }

    /// The `(event, tier)` identity of this line
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey {
            event_id: self.event_id.clone(),
            tier_id: self.tier_id.clone(),
        }
    }

    /// Whether this line belongs to `key`
    #[must_use]
    pub fn matches(&self, key: &LineKey) -> bool {
        self.event_id == key.event_id && self.tier_id == key.tier_id
    }

    /// Price times quantity
    #[must_use]
    pub const fn line_total(&self) -> Money {
        self.price.saturating_multiply(self.quantity)
    }
}

/// Derived cart totals
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CartTotals {
    /// Sum of line totals
    pub subtotal: Money,
    /// Promo discount, capped at the subtotal
    pub discount: Money,
    /// Tax on the discounted subtotal
    pub tax: Money,
    /// Amount due
    pub final_total: Money,
}

/// The local cart
///
/// # Example
///
/// ```
/// use ticket_cart::{CartLineItem, LocalCart, Money};
/// use chrono::Utc;
///
/// let mut cart = LocalCart::new(1_000); // 10% tax
/// cart.add_item(CartLineItem::new("evt-1", "ga", Money::from_minor(2_500), 2, Utc::now()));
/// cart.set_promo_code("EARLY", Money::from_minor(1_000));
///
/// let totals = cart.totals();
/// assert_eq!(totals.subtotal, Money::from_minor(5_000));
/// assert_eq!(totals.tax, Money::from_minor(400));
/// assert_eq!(totals.final_total, Money::from_minor(4_400));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalCart {
    items: Vec<CartLineItem>,
    promo_code: Option<String>,
    discount: Money,
    tax_rate_bps: u32,
}

impl LocalCart {
    /// Creates an empty cart with the given tax rate in basis points
    #[must_use]
    pub const fn new(tax_rate_bps: u32) -> Self {
        Self {
            items: Vec::new(),
            promo_code: None,
            discount: Money::ZERO,
            tax_rate_bps,
        }
    }

    /// Line items in insertion order
    #[must_use]
    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    /// The line for `key`, if present
    #[must_use]
    pub fn item(&self, key: &LineKey) -> Option<&CartLineItem> {
        self.items.iter().find(|item| item.matches(key))
    }

    /// Applied promo code
    #[must_use]
    pub fn promo_code(&self) -> Option<&str> {
        self.promo_code.as_deref()
    }

    /// Discount granted by the promo code, before capping
    #[must_use]
    pub const fn discount(&self) -> Money {
        self.discount
    }

    /// Tax rate in basis points
    #[must_use]
    pub const fn tax_rate_bps(&self) -> u32 {
        self.tax_rate_bps
    }

    /// Whether the cart has no lines
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of tickets across all lines
    #[must_use]
    pub fn ticket_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Earliest `added_at` among the lines
    #[must_use]
    pub fn oldest_added_at(&self) -> Option<DateTime<Utc>> {
        self.items.iter().map(|item| item.added_at).min()
    }

    /// Computes subtotal, discount, tax and final total
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        let subtotal = self
            .items
            .iter()
            .fold(Money::ZERO, |sum, item| sum.saturating_add(item.line_total()));
        let discount = self.discount.min(subtotal);
        let taxable = subtotal.saturating_sub(discount);
        let tax = taxable.basis_points(self.tax_rate_bps);

        CartTotals {
            subtotal,
            discount,
            tax,
            final_total: taxable.saturating_add(tax),
        }
    }

    /// Removes every line and the promo code. The tax rate is kept.
    pub fn clear(&mut self) {
        self.items.clear();
        self.promo_code = None;
        self.discount = Money::ZERO;
    }

    /// Adds a line, merging quantity into an existing line for the same
    /// `(event, tier)`
    ///
    /// A merged line keeps its original `added_at`, so adding more tickets
    /// does not extend the hold.
    pub fn add_item(&mut self, item: CartLineItem) {
        match self.items.iter_mut().find(|line| line.matches(&item.key())) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
            },
            None => self.items.push(item),
        }
    }

    /// Removes the line for `key`. Returns whether a line was removed.
    pub fn remove_item(&mut self, key: &LineKey) -> bool {
        let before = self.items.len();
        self.items.retain(|item| !item.matches(key));
        self.items.len() != before
    }

    /// Sets the quantity of the line for `key`; zero removes the line.
    ///
    /// Returns whether the cart changed.
    pub fn update_quantity(&mut self, key: &LineKey, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove_item(key);
        }
        match self.items.iter_mut().find(|item| item.matches(key)) {
            Some(item) if item.quantity != quantity => {
                item.quantity = quantity;
                true
            },
            _ => false,
        }
    }

    /// Applies a promo code and the discount it grants
    ///
    /// A blank code is stored as no code.
    pub fn set_promo_code(&mut self, code: impl Into<String>, discount: Money) {
        let code = code.into();
        let code = code.trim();
        self.promo_code = (!code.is_empty()).then(|| code.to_string());
        self.discount = discount;
    }

    /// Removes the promo code and its discount. Returns whether one was set.
    pub fn remove_promo_code(&mut self) -> bool {
        let changed = self.promo_code.is_some() || !self.discount.is_zero();
        self.promo_code = None;
        self.discount = Money::ZERO;
        changed
    }
}
