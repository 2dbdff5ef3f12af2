//! Document store abstraction for per-key synchronized documents.
//!
//! A document store holds one document per [`DocumentKey`] and offers two
//! operations:
//!
//! - **write**: full replace of the document (upsert, no patching)
//! - **subscribe**: a live stream of snapshots, starting with the current
//!   state of the document and followed by every later change
//!
//! A missing document is not an error; it is delivered as
//! [`Snapshot::NotFound`]. Transport problems on a live subscription are
//! delivered in-band as `Err` items and do not end the stream. The store is
//! expected to reconnect on its own.
//!
//! Dropping the [`SnapshotStream`] unsubscribes.
//!
//! # Implementations
//!
//! - `InMemoryDocumentStore` (in `cart-sync-testing`): watch-channel backed, with failure injection
//!
//! # Example
//!
//! ```rust,ignore
//! use cart_sync_core::document_store::{DocumentKey, DocumentStore, Snapshot};
//! use futures::StreamExt;
//!
//! async fn follow(store: &dyn DocumentStore<CartDocument>) -> Result<(), DocumentStoreError> {
//!     let key = DocumentKey::new("user-42");
//!     let mut snapshots = store.subscribe(&key).await?;
//!     while let Some(snapshot) = snapshots.next().await {
//!         match snapshot {
//!             Ok(Snapshot::Found(cart)) => render(cart),
//!             Ok(Snapshot::NotFound) => render(CartDocument::default()),
//!             Err(e) => tracing::error!("snapshot error: {e}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `DocumentKey` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid document key: {0}")]
pub struct ParseDocumentKeyError(String);

/// Key of a single document in a [`DocumentStore`].
///
/// For the cart this is the user identifier: one cart document per user.
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty strings)
/// - `From::from()` and `new()`: No validation (for trusted input)
///
/// # Examples
///
/// ```
/// use cart_sync_core::document_store::DocumentKey;
///
/// let key = DocumentKey::new("user-42");
/// assert_eq!(key.as_str(), "user-42");
///
/// assert!("".parse::<DocumentKey>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Create a new `DocumentKey` from a string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentKey {
    type Err = ParseDocumentKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseDocumentKeyError(
                "Document key cannot be empty".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for DocumentKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DocumentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur during document store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentStoreError {
    /// The store cannot be reached (offline, not configured)
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    /// A write was rejected or could not be delivered
    #[error("Write failed for document '{key}': {reason}")]
    WriteFailed {
        /// The document that failed to write
        key: DocumentKey,
        /// The reason for failure
        reason: String,
    },

    /// Opening a subscription failed
    #[error("Subscription failed for document '{key}': {reason}")]
    SubscriptionFailed {
        /// The document that failed to subscribe
        key: DocumentKey,
        /// The reason for failure
        reason: String,
    },

    /// A stored document could not be decoded
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Network or transport error on a live subscription
    #[error("Transport error: {0}")]
    Transport(String),
}

/// A point-in-time read of one document.
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot<D> {
    /// The document exists
    Found(D),
    /// The document has never been written
    NotFound,
}

impl<D> Snapshot<D> {
    /// The document, if it exists
    #[must_use]
    pub fn into_document(self) -> Option<D> {
        match self {
            Self::Found(document) => Some(document),
            Self::NotFound => None,
        }
    }

    /// Whether the document exists
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Documents whose last-write timestamp is assigned by the store.
///
/// Stores call [`set_server_timestamp`](ServerTimestamp::set_server_timestamp)
/// on every write, overriding whatever the writer supplied.
pub trait ServerTimestamp {
    /// Record the store-assigned write time
    fn set_server_timestamp(&mut self, at: DateTime<Utc>);
}

/// Stream of snapshots from a subscription.
pub type SnapshotStream<D> =
    Pin<Box<dyn Stream<Item = Result<Snapshot<D>, DocumentStoreError>> + Send>>;

/// Trait for document store implementations.
///
/// # Delivery
///
/// - The first item of a subscription is the current state of the document
/// - Later items follow the store's write order for that document
/// - Delivery is at-least-once; identical snapshots may repeat
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn DocumentStore<D>>`). Reducers capture
/// the store inside effects.
pub trait DocumentStore<D>: Send + Sync {
    /// Replace the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::WriteFailed`] or
    /// [`DocumentStoreError::Unavailable`] if the write cannot be applied.
    fn write(
        &self,
        key: &DocumentKey,
        document: D,
    ) -> Pin<Box<dyn Future<Output = Result<(), DocumentStoreError>> + Send + '_>>;

    /// Subscribe to the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::SubscriptionFailed`] if the subscription
    /// cannot be opened.
    fn subscribe(
        &self,
        key: &DocumentKey,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream<D>, DocumentStoreError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_key_rejects_empty_input() {
        let err = "".parse::<DocumentKey>();
        assert!(err.is_err());

        let key: DocumentKey = "user-1".parse().unwrap_or_else(|_| DocumentKey::new("?"));
        assert_eq!(key, DocumentKey::from("user-1"));
        assert_eq!(key.to_string(), "user-1");
    }

    #[test]
    fn snapshot_accessors() {
        let found = Snapshot::Found(3);
        assert!(found.is_found());
        assert_eq!(found.into_document(), Some(3));

        let missing: Snapshot<i32> = Snapshot::NotFound;
        assert!(!missing.is_found());
        assert_eq!(missing.into_document(), None);
    }

    #[test]
    fn errors_render_key_and_reason() {
        let err = DocumentStoreError::WriteFailed {
            key: DocumentKey::new("user-9"),
            reason: "offline".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Write failed for document 'user-9': offline"
        );
    }
}
