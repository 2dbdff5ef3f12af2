//! Diagnostics reported by the sync engine.
//!
//! Sync problems never surface as errors to callers. They are reported to an
//! injected [`DiagnosticSink`] instead; the default sink logs them.

use crate::types::{EventId, Money, TierId, UserId};
use cart_sync_core::document_store::DocumentStoreError;
use std::sync::{Arc, Mutex, PoisonError};

/// Something the sync engine wants a human to know about
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// A remote snapshot changed the price of a line the user already had
    PriceChanged {
        /// Event of the line
        event_id: EventId,
        /// Tier of the line
        tier_id: TierId,
        /// Local price before the snapshot
        old_price: Money,
        /// Price in the snapshot
        new_price: Money,
    },
    /// The cart subscription reported an error
    SubscriptionFailed {
        /// Owner of the cart document
        user_id: UserId,
        /// What went wrong
        error: DocumentStoreError,
    },
    /// A write-back was not applied
    WriteFailed {
        /// Owner of the cart document
        user_id: UserId,
        /// What went wrong
        error: DocumentStoreError,
    },
}

impl Diagnostic {
    /// Short stable name, used as a metrics label
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PriceChanged { .. } => "price_changed",
            Self::SubscriptionFailed { .. } => "subscription_failed",
            Self::WriteFailed { .. } => "write_failed",
        }
    }
}

/// Receiver of sync diagnostics
pub trait DiagnosticSink: Send + Sync {
    /// Report one diagnostic
    fn report(&self, diagnostic: Diagnostic);
}

/// Default sink: price changes as warnings, store failures as errors
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::PriceChanged {
                event_id,
                tier_id,
                old_price,
                new_price,
            } => {
                tracing::warn!(
                    event_id = %event_id,
                    tier_id = %tier_id,
                    old_price = %old_price,
                    new_price = %new_price,
                    "Ticket price changed since it was added to the cart"
                );
            },
            Diagnostic::SubscriptionFailed { user_id, error } => {
                tracing::error!(user_id = %user_id, error = %error, "Cart subscription error");
            },
            Diagnostic::WriteFailed { user_id, error } => {
                tracing::error!(user_id = %user_id, error = %error, "Cart write-back failed");
            },
        }
    }
}

/// Sink that keeps every diagnostic in memory
///
/// Clones share the same record.
///
/// ```
/// use ticket_cart::{Diagnostic, DiagnosticSink, Money, RecordingDiagnostics};
///
/// let sink = RecordingDiagnostics::new();
/// sink.report(Diagnostic::PriceChanged {
///     event_id: "evt-1".into(),
///     tier_id: "ga".into(),
///     old_price: Money::from_minor(100),
///     new_price: Money::from_minor(120),
/// });
/// assert_eq!(sink.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingDiagnostics {
    recorded: Arc<Mutex<Vec<Diagnostic>>>,
}

impl RecordingDiagnostics {
    /// Creates an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far, in order
    #[must_use]
    pub fn all(&self) -> Vec<Diagnostic> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of diagnostics reported
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing was reported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of diagnostics of the given [`kind`](Diagnostic::kind)
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|diagnostic| diagnostic.kind() == kind)
            .count()
    }
}

impl DiagnosticSink for RecordingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }
}
