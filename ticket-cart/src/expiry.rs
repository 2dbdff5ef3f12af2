//! Cart expiry countdown.
//!
//! A cart is held for a fixed window after its oldest line was added. The
//! calculator is a pure function of the oldest timestamp and the current
//! time; [`countdown`] drives it on a timer.

use cart_sync_core::environment::Clock;
use chrono::{DateTime, TimeDelta, Utc};
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Hold window and warning threshold
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// How long a cart is held after its oldest line was added
    pub window: Duration,
    /// Remaining time at or below which the cart is about to expire
    pub warning: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            warning: Duration::from_secs(5 * 60),
        }
    }
}

/// Countdown state at one instant
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartExpiry {
    /// When the cart expires; `None` for an empty cart
    pub expires_at: Option<DateTime<Utc>>,
    /// Time left, floored at zero
    pub remaining: Duration,
    /// Whether the hold has run out
    pub expired: bool,
    /// Whether the hold is about to run out
    pub warning: bool,
    /// Remaining whole seconds as zero-padded `MM:SS`
    pub formatted: String,
}

impl CartExpiry {
    /// Computes the countdown for a cart whose oldest line was added at
    /// `oldest_added_at`
    ///
    /// An empty cart reports the full window and never expires.
    ///
    /// ```
    /// use chrono::{TimeDelta, Utc};
    /// use ticket_cart::{CartExpiry, ExpiryPolicy};
    ///
    /// let t0 = Utc::now();
    /// let expiry = CartExpiry::compute(
    ///     Some(t0),
    ///     t0 + TimeDelta::seconds(14 * 60 + 59),
    ///     &ExpiryPolicy::default(),
    /// );
    /// assert!(!expiry.expired);
    /// assert!(expiry.warning);
    /// assert_eq!(expiry.formatted, "00:01");
    /// ```
    #[must_use]
    pub fn compute(
        oldest_added_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        policy: &ExpiryPolicy,
    ) -> Self {
        let Some(oldest) = oldest_added_at else {
            return Self {
                expires_at: None,
                remaining: policy.window,
                expired: false,
                warning: false,
                formatted: format_mm_ss(policy.window),
            };
        };

        let window = TimeDelta::from_std(policy.window).unwrap_or(TimeDelta::MAX);
        let expires_at = oldest.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let remaining = (expires_at - now).to_std().unwrap_or(Duration::ZERO);

        Self {
            expires_at: Some(expires_at),
            remaining,
            expired: remaining.is_zero(),
            warning: !remaining.is_zero() && remaining <= policy.warning,
            formatted: format_mm_ss(remaining),
        }
    }

    /// Remaining time in whole milliseconds
    #[must_use]
    pub fn remaining_ms(&self) -> u128 {
        self.remaining.as_millis()
    }
}

/// Renders whole seconds of `remaining` as zero-padded `MM:SS`
///
/// Minutes are not wrapped into hours.
#[must_use]
pub fn format_mm_ss(remaining: Duration) -> String {
    let seconds = remaining.as_secs();
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Recomputes the expiry every `tick` until it expires
///
/// The first value is yielded immediately. The stream ends right after the
/// first expired value, or after the single value of an empty cart.
pub fn countdown(
    clock: Arc<dyn Clock>,
    oldest_added_at: Option<DateTime<Utc>>,
    policy: ExpiryPolicy,
    tick: Duration,
) -> impl Stream<Item = CartExpiry> + Send + 'static {
    async_stream::stream! {
        let mut interval = tokio::time::interval(tick.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let expiry = CartExpiry::compute(oldest_added_at, clock.now(), &policy);
            let done = expiry.expired || expiry.expires_at.is_none();
            if done {
                tracing::debug!(expired = expiry.expired, "Cart countdown finished");
            }
            yield expiry;
            if done {
                break;
            }
        }
    }
}
