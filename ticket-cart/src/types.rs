//! Identifier and value types shared by the cart and the sync engine.

use cart_sync_core::document_store::DocumentKey;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Stable identifier of an authenticated user
    UserId
);

string_id!(
    /// Identifier of an event in the catalog
    EventId
);

string_id!(
    /// Identifier of a ticket tier within an event
    TierId
);

impl From<&UserId> for DocumentKey {
    fn from(user_id: &UserId) -> Self {
        Self::new(user_id.as_str())
    }
}

/// Identity of a cart line: one tier of one event
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineKey {
    /// Event the tickets are for
    pub event_id: EventId,
    /// Ticket tier within the event
    pub tier_id: TierId,
}

impl LineKey {
    /// Creates a new line key
    #[must_use]
    pub fn new(event_id: impl Into<EventId>, tier_id: impl Into<TierId>) -> Self {
        Self {
            event_id: event_id.into(),
            tier_id: tier_id.into(),
        }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event_id, self.tier_id)
    }
}

// ============================================================================
// Money Value Object (minor units to avoid floating point errors)
// ============================================================================

/// Basis points in one whole (100%)
const BASIS_POINTS: u128 = 10_000;

/// Represents money in minor currency units (cents, paise)
///
/// Arithmetic used by the cart saturates instead of overflowing.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts, saturating at the maximum
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtracts two money amounts, saturating at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Multiplies money by a quantity, saturating at the maximum
    #[must_use]
    pub const fn saturating_multiply(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as u64))
    }

    /// The given fraction of this amount in basis points, rounded down
    ///
    /// ```
    /// use ticket_cart::Money;
    ///
    /// // 18% of 10.99
    /// assert_eq!(Money::from_minor(1099).basis_points(1800), Money::from_minor(197));
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Result is at most self.0 * u32::MAX / 10_000
    pub const fn basis_points(self, bps: u32) -> Self {
        let scaled = (self.0 as u128) * (bps as u128) / BASIS_POINTS;
        if scaled > u64::MAX as u128 {
            Self(u64::MAX)
        } else {
            Self(scaled as u64)
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
