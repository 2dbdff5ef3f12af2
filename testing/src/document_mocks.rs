//! In-memory document store for fast, deterministic tests
//!
//! Documents are kept as JSON values so tests can exercise the same
//! serialization path a real store would, and can inject raw or malformed
//! documents the way another client or an older app version would.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use cart_sync_core::document_store::{
    DocumentKey, DocumentStore, DocumentStoreError, ServerTimestamp, Snapshot, SnapshotStream,
};
use cart_sync_core::environment::{Clock, SystemClock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Subscription lifecycle event recorded by [`InMemoryDocumentStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// A subscription to the document was opened
    Subscribed(DocumentKey),
    /// A subscription stream for the document was dropped
    Unsubscribed(DocumentKey),
}

#[derive(Clone, Debug)]
enum StoredEntry {
    Missing,
    Present(Value),
    Broken(String),
}

#[derive(Debug, Default)]
struct Inner {
    documents: Mutex<HashMap<DocumentKey, watch::Sender<StoredEntry>>>,
    writes: Mutex<Vec<(DocumentKey, Value)>>,
    events: Mutex<Vec<SubscriptionEvent>>,
    fail_writes: AtomicBool,
    fail_subscriptions: AtomicBool,
}

impl Inner {
    fn channel(&self, key: &DocumentKey) -> watch::Sender<StoredEntry> {
        self.documents
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert_with(|| watch::channel(StoredEntry::Missing).0)
            .clone()
    }

    fn record(&self, event: SubscriptionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Records the unsubscribe when the snapshot stream is dropped
struct UnsubscribeGuard {
    inner: Arc<Inner>,
    key: DocumentKey,
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        tracing::trace!(key = %self.key, "In-memory subscription dropped");
        self.inner
            .record(SubscriptionEvent::Unsubscribed(self.key.clone()));
    }
}

/// In-memory [`DocumentStore`] backed by one watch channel per document.
///
/// - Every subscriber first sees the current document, then each later write
/// - Writes stamp the server timestamp from the injected clock
/// - Writes, subscriptions and unsubscriptions are recorded for assertions
/// - Write and subscribe failures can be switched on and off
///
/// Clones share the same documents, so two engines built on clones behave
/// like two devices of the same user.
///
/// A watch channel only keeps the latest value, so a slow subscriber may skip
/// intermediate snapshots. That matches the delivery contract.
///
/// # Example
///
/// ```
/// use cart_sync_core::document_store::{DocumentKey, DocumentStore, ServerTimestamp};
/// use cart_sync_testing::InMemoryDocumentStore;
/// use chrono::{DateTime, Utc};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, Default, Serialize, Deserialize)]
/// struct Note {
///     text: String,
///     updated_at: Option<DateTime<Utc>>,
/// }
///
/// impl ServerTimestamp for Note {
///     fn set_server_timestamp(&mut self, at: DateTime<Utc>) {
///         self.updated_at = Some(at);
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let store = InMemoryDocumentStore::<Note>::new();
/// let key = DocumentKey::new("user-1");
/// store.write(&key, Note { text: "hi".into(), updated_at: None }).await.unwrap();
///
/// let stored = store.document(&key).unwrap();
/// assert_eq!(stored.text, "hi");
/// assert!(stored.updated_at.is_some());
/// # });
/// ```
pub struct InMemoryDocumentStore<D> {
    inner: Arc<Inner>,
    clock: Arc<dyn Clock>,
    _document: PhantomData<fn() -> D>,
}

impl<D> Clone for InMemoryDocumentStore<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
            _document: PhantomData,
        }
    }
}

impl<D> std::fmt::Debug for InMemoryDocumentStore<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("documents", &self.inner.documents.lock().unwrap().len())
            .field("writes", &self.inner.writes.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl<D> Default for InMemoryDocumentStore<D>
where
    D: Serialize + DeserializeOwned + ServerTimestamp + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<D> InMemoryDocumentStore<D>
where
    D: Serialize + DeserializeOwned + ServerTimestamp + Send + 'static,
{
    /// Create an empty store stamping writes with the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamping writes with `clock`
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            clock,
            _document: PhantomData,
        }
    }

    /// Make every following write fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every following subscribe call fail (or succeed again)
    pub fn fail_subscriptions(&self, fail: bool) {
        self.inner.fail_subscriptions.store(fail, Ordering::SeqCst);
    }

    /// Store a document as if another client had written it
    ///
    /// Stamps the server timestamp and notifies subscribers, but is not
    /// recorded in [`writes`](Self::writes).
    pub fn put(&self, key: &DocumentKey, mut document: D) {
        document.set_server_timestamp(self.clock.now());
        let value = serde_json::to_value(&document).unwrap();
        self.inner
            .channel(key)
            .send_replace(StoredEntry::Present(value));
    }

    /// Store a raw JSON document, bypassing serialization and stamping
    pub fn put_raw(&self, key: &DocumentKey, value: Value) {
        self.inner
            .channel(key)
            .send_replace(StoredEntry::Present(value));
    }

    /// Delete a document; subscribers see `NotFound`
    pub fn delete(&self, key: &DocumentKey) {
        self.inner.channel(key).send_replace(StoredEntry::Missing);
    }

    /// Deliver a transport error to every subscriber of `key`
    ///
    /// The error stays the current state until the next write, so a
    /// subscriber opened in between starts with the error too.
    pub fn emit_error(&self, key: &DocumentKey, message: impl Into<String>) {
        self.inner
            .channel(key)
            .send_replace(StoredEntry::Broken(message.into()));
    }

    /// The current document under `key`, if present and decodable
    #[must_use]
    pub fn document(&self, key: &DocumentKey) -> Option<D> {
        match &*self.inner.channel(key).borrow() {
            StoredEntry::Present(value) => serde_json::from_value(value.clone()).ok(),
            StoredEntry::Missing | StoredEntry::Broken(_) => None,
        }
    }

    /// Every successful write, in order
    #[must_use]
    pub fn writes(&self) -> Vec<(DocumentKey, D)> {
        self.inner
            .writes
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(key, value)| {
                serde_json::from_value(value.clone())
                    .ok()
                    .map(|document| (key.clone(), document))
            })
            .collect()
    }

    /// Successful writes to `key`, in order
    #[must_use]
    pub fn writes_for(&self, key: &DocumentKey) -> Vec<D> {
        self.writes()
            .into_iter()
            .filter(|(written, _)| written == key)
            .map(|(_, document)| document)
            .collect()
    }

    /// Number of successful writes
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner.writes.lock().unwrap().len()
    }

    /// Subscribe/unsubscribe history, in order
    #[must_use]
    pub fn subscription_events(&self) -> Vec<SubscriptionEvent> {
        self.inner.events.lock().unwrap().clone()
    }

    /// Number of live subscriptions to `key`
    #[must_use]
    pub fn active_subscriptions(&self, key: &DocumentKey) -> usize {
        self.inner
            .documents
            .lock()
            .unwrap()
            .get(key)
            .map_or(0, watch::Sender::receiver_count)
    }
}

fn decode<D: DeserializeOwned>(entry: &StoredEntry) -> Result<Snapshot<D>, DocumentStoreError> {
    match entry {
        StoredEntry::Missing => Ok(Snapshot::NotFound),
        StoredEntry::Present(value) => serde_json::from_value(value.clone())
            .map(Snapshot::Found)
            .map_err(|e| DocumentStoreError::Deserialization(e.to_string())),
        StoredEntry::Broken(message) => Err(DocumentStoreError::Transport(message.clone())),
    }
}

impl<D> DocumentStore<D> for InMemoryDocumentStore<D>
where
    D: Serialize + DeserializeOwned + ServerTimestamp + Send + 'static,
{
    fn write(
        &self,
        key: &DocumentKey,
        mut document: D,
    ) -> Pin<Box<dyn Future<Output = Result<(), DocumentStoreError>> + Send + '_>> {
        let key = key.clone();
        Box::pin(async move {
            if self.inner.fail_writes.load(Ordering::SeqCst) {
                return Err(DocumentStoreError::WriteFailed {
                    key,
                    reason: "injected write failure".to_string(),
                });
            }

            document.set_server_timestamp(self.clock.now());
            let value =
                serde_json::to_value(&document).map_err(|e| DocumentStoreError::WriteFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;

            tracing::trace!(key = %key, "In-memory write");
            self.inner
                .writes
                .lock()
                .unwrap()
                .push((key.clone(), value.clone()));
            self.inner
                .channel(&key)
                .send_replace(StoredEntry::Present(value));
            Ok(())
        })
    }

    fn subscribe(
        &self,
        key: &DocumentKey,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream<D>, DocumentStoreError>> + Send + '_>>
    {
        let key = key.clone();
        Box::pin(async move {
            if self.inner.fail_subscriptions.load(Ordering::SeqCst) {
                return Err(DocumentStoreError::SubscriptionFailed {
                    key,
                    reason: "injected subscribe failure".to_string(),
                });
            }

            let mut rx = self.inner.channel(&key).subscribe();
            self.inner
                .record(SubscriptionEvent::Subscribed(key.clone()));
            let guard = UnsubscribeGuard {
                inner: Arc::clone(&self.inner),
                key,
            };

            let snapshots = async_stream::stream! {
                let _guard = guard;
                loop {
                    let entry = rx.borrow_and_update().clone();
                    yield decode::<D>(&entry);
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            };

            Ok(Box::pin(snapshots) as SnapshotStream<D>)
        })
    }
}
