//! Integration tests for the cart sync engine over an in-memory document store
//!
//! Every test runs on a paused tokio clock: debounce timers only elapse when
//! the test advances time.

#![allow(clippy::unwrap_used)] // Test code

use cart_sync_core::document_store::DocumentKey;
use cart_sync_core::environment::Clock;
use cart_sync_runtime::StoreError;
use cart_sync_testing::{InMemoryDocumentStore, ManualClock, SubscriptionEvent, manual_clock};
use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;
use ticket_cart::{
    AuthContext, CartDocument, CartLineItem, CartSyncEngine, CartSyncEnvironment, Diagnostic,
    LineKey, LocalCart, Money, RecordingDiagnostics, SyncConfig, SyncPhase, UserId,
};

struct Harness {
    engine: CartSyncEngine,
    documents: InMemoryDocumentStore<CartDocument>,
    diagnostics: RecordingDiagnostics,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        let clock = manual_clock();
        let documents = InMemoryDocumentStore::with_clock(Arc::new(clock.clone()));
        Self::sharing(&documents, clock)
    }

    /// Another session on the same document store
    fn sharing(documents: &InMemoryDocumentStore<CartDocument>, clock: ManualClock) -> Self {
        let diagnostics = RecordingDiagnostics::new();
        let engine = CartSyncEngine::new(CartSyncEnvironment::new(
            Arc::new(clock.clone()),
            Arc::new(documents.clone()),
            Arc::new(diagnostics.clone()),
            SyncConfig::default(),
        ));
        Self {
            engine,
            documents: documents.clone(),
            diagnostics,
            clock,
        }
    }

    async fn sign_in(&self, user: &str) {
        self.engine
            .set_auth(AuthContext::signed_in(user))
            .await
            .unwrap();
        settle().await;
    }
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

async fn advance(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}

fn key(user: &str) -> DocumentKey {
    DocumentKey::from(&UserId::new(user))
}

fn ticket(event: &str, tier: &str, price: u64, quantity: u32) -> CartLineItem {
    CartLineItem::new(
        event,
        tier,
        Money::from_minor(price),
        quantity,
        manual_clock().now(),
    )
    .with_event("Jazz Night", "2025-03-01")
    .with_tier_name(tier)
}

fn remote_cart(items: Vec<CartLineItem>) -> CartDocument {
    let mut cart = LocalCart::default();
    for item in items {
        cart.add_item(item);
    }
    CartDocument::from_cart(&cart)
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_writes_once_with_final_state() {
    let h = Harness::new();
    h.sign_in("alice").await;
    assert_eq!(h.engine.phase().await, SyncPhase::Synced { user_id: UserId::new("alice") });

    h.engine.add_item(ticket("evt-1", "ga", 2_500, 1)).await.unwrap();
    settle().await;
    advance(300).await;
    h.engine
        .update_quantity(LineKey::new("evt-1", "ga"), 4)
        .await
        .unwrap();
    settle().await;
    advance(300).await;
    h.engine.add_item(ticket("evt-2", "vip", 9_000, 1)).await.unwrap();
    settle().await;
    advance(300).await;
    h.engine
        .apply_promo_code("EARLY", Money::from_minor(1_000))
        .await
        .unwrap();
    settle().await;

    advance(799).await;
    assert_eq!(h.documents.write_count(), 0);

    advance(2).await;
    let writes = h.documents.writes_for(&key("alice"));
    assert_eq!(writes.len(), 1);

    let written = &writes[0];
    assert_eq!(written.items.len(), 2);
    assert_eq!(written.items[0].quantity, 4);
    assert_eq!(written.promo_code.as_deref(), Some("EARLY"));
    assert_eq!(written.discount, Some(Money::from_minor(1_000)));
    assert_eq!(written.final_total, Some(Money::from_minor(18_000)));
    assert_eq!(written.updated_at, Some(h.clock.now()));

    // The write comes back as a snapshot and stops there
    advance(5_000).await;
    assert_eq!(h.documents.write_count(), 1);
    assert_eq!(h.engine.cart().await.ticket_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn promo_larger_than_subtotal_survives_its_own_echo() {
    let h = Harness::new();
    h.sign_in("alice").await;

    h.engine.add_item(ticket("evt-1", "ga", 500, 1)).await.unwrap();
    h.engine
        .apply_promo_code("SAVE10", Money::from_minor(1_000))
        .await
        .unwrap();
    settle().await;
    advance(801).await;

    let writes = h.documents.writes_for(&key("alice"));
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].discount, Some(Money::from_minor(1_000)));
    assert_eq!(writes[0].final_total, Some(Money::ZERO));
    assert_eq!(h.engine.cart().await.discount(), Money::from_minor(1_000));

    h.engine.add_item(ticket("evt-2", "ga", 2_000, 1)).await.unwrap();
    settle().await;

    let totals = h.engine.totals().await;
    assert_eq!(totals.subtotal, Money::from_minor(2_500));
    assert_eq!(totals.discount, Money::from_minor(1_000));
    assert_eq!(totals.final_total, Money::from_minor(1_500));

    advance(801).await;
    let writes = h.documents.writes_for(&key("alice"));
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[1].discount, Some(Money::from_minor(1_000)));
    assert_eq!(writes[1].final_total, Some(Money::from_minor(1_500)));
}

#[tokio::test(start_paused = true)]
async fn adopted_snapshot_is_never_written_back() {
    let h = Harness::new();
    h.sign_in("alice").await;

    h.documents
        .put(&key("alice"), remote_cart(vec![ticket("evt-1", "ga", 2_500, 2)]));
    settle().await;
    assert_eq!(h.engine.cart().await.ticket_count(), 2);

    advance(5_000).await;
    assert_eq!(h.documents.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn price_change_sets_original_price_and_reports() {
    let h = Harness::new();
    h.sign_in("alice").await;
    h.documents
        .put(&key("alice"), remote_cart(vec![ticket("E", "T", 100, 1)]));
    settle().await;

    h.documents
        .put(&key("alice"), remote_cart(vec![ticket("E", "T", 120, 1)]));
    settle().await;

    let cart = h.engine.cart().await;
    let item = cart.item(&LineKey::new("E", "T")).unwrap();
    assert_eq!(item.price, Money::from_minor(120));
    assert_eq!(item.original_price, Some(Money::from_minor(100)));
    assert_eq!(
        h.diagnostics.all(),
        vec![Diagnostic::PriceChanged {
            event_id: "E".into(),
            tier_id: "T".into(),
            old_price: Money::from_minor(100),
            new_price: Money::from_minor(120),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn remote_snapshot_supersedes_pending_local_edit() {
    let h = Harness::new();
    h.sign_in("alice").await;

    h.engine.add_item(ticket("E", "T", 100, 1)).await.unwrap();
    settle().await;
    advance(400).await;

    h.documents
        .put(&key("alice"), remote_cart(vec![ticket("E", "T", 120, 3)]));
    settle().await;

    let cart = h.engine.cart().await;
    assert_eq!(cart.ticket_count(), 3);
    assert_eq!(cart.items()[0].original_price, Some(Money::from_minor(100)));

    advance(2_000).await;
    assert_eq!(h.documents.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_document_is_an_empty_cart() {
    let h = Harness::new();
    h.engine.add_item(ticket("E", "T", 100, 1)).await.unwrap();

    h.sign_in("alice").await;

    let cart = h.engine.cart().await;
    assert!(cart.is_empty());
    assert_eq!(cart.promo_code(), None);
    assert!(h.engine.is_initialized().await);
    assert!(h.diagnostics.is_empty());
}

#[tokio::test(start_paused = true)]
async fn no_write_back_until_first_snapshot() {
    let h = Harness::new();
    h.documents.fail_subscriptions(true);
    h.sign_in("alice").await;

    assert_eq!(
        h.engine.phase().await,
        SyncPhase::AwaitingFirstSnapshot { user_id: UserId::new("alice") }
    );
    assert_eq!(h.diagnostics.count("subscription_failed"), 1);

    h.engine.add_item(ticket("E", "T", 100, 1)).await.unwrap();
    settle().await;
    advance(5_000).await;

    assert_eq!(h.documents.write_count(), 0);
    assert_eq!(h.engine.cart().await.ticket_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn sign_out_cancels_pending_write() {
    let h = Harness::new();
    h.sign_in("alice").await;

    h.engine.add_item(ticket("E", "T", 100, 1)).await.unwrap();
    settle().await;
    advance(400).await;

    h.engine.set_auth(AuthContext::signed_out()).await.unwrap();
    settle().await;
    assert_eq!(h.engine.phase().await, SyncPhase::Inactive);
    assert_eq!(h.documents.active_subscriptions(&key("alice")), 0);

    advance(2_000).await;
    assert_eq!(h.documents.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn switching_user_unsubscribes_before_subscribing() {
    let h = Harness::new();
    h.documents
        .put(&key("alice"), remote_cart(vec![ticket("alice-evt", "ga", 100, 1)]));

    h.sign_in("alice").await;
    assert_eq!(h.engine.cart().await.ticket_count(), 1);

    h.sign_in("bob").await;
    assert_eq!(
        h.documents.subscription_events(),
        vec![
            SubscriptionEvent::Subscribed(key("alice")),
            SubscriptionEvent::Unsubscribed(key("alice")),
            SubscriptionEvent::Subscribed(key("bob")),
        ]
    );
    assert!(h.engine.cart().await.is_empty());

    // Later changes to alice's cart never reach bob's session
    h.documents
        .put(&key("alice"), remote_cart(vec![ticket("late", "ga", 100, 7)]));
    settle().await;
    assert!(h.engine.cart().await.is_empty());

    h.engine.add_item(ticket("bob-evt", "ga", 100, 1)).await.unwrap();
    settle().await;
    advance(801).await;
    assert_eq!(h.documents.writes_for(&key("bob")).len(), 1);
    assert!(h.documents.writes_for(&key("alice")).is_empty());
}

#[tokio::test(start_paused = true)]
async fn write_failure_is_reported_and_not_retried() {
    let h = Harness::new();
    h.sign_in("alice").await;
    h.documents.fail_writes(true);

    h.engine.add_item(ticket("E", "T", 100, 1)).await.unwrap();
    settle().await;
    advance(801).await;
    assert_eq!(h.diagnostics.count("write_failed"), 1);

    h.documents.fail_writes(false);
    advance(10_000).await;
    assert_eq!(h.documents.write_count(), 0);
    assert_eq!(h.engine.cart().await.ticket_count(), 1);

    // The next local change writes the whole cart
    h.engine
        .update_quantity(LineKey::new("E", "T"), 2)
        .await
        .unwrap();
    settle().await;
    advance(801).await;
    let writes = h.documents.writes_for(&key("alice"));
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].items[0].quantity, 2);
}

#[tokio::test(start_paused = true)]
async fn subscription_error_is_reported_and_stream_survives() {
    let h = Harness::new();
    h.sign_in("alice").await;

    h.documents.emit_error(&key("alice"), "connection reset");
    settle().await;
    assert_eq!(h.diagnostics.count("subscription_failed"), 1);
    assert!(h.engine.is_initialized().await);
    assert_eq!(h.documents.active_subscriptions(&key("alice")), 1);

    h.documents
        .put(&key("alice"), remote_cart(vec![ticket("E", "T", 100, 2)]));
    settle().await;
    assert_eq!(h.engine.cart().await.ticket_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn losing_remote_storage_tears_down() {
    let h = Harness::new();
    h.sign_in("alice").await;

    h.engine.add_item(ticket("E", "T", 100, 1)).await.unwrap();
    settle().await;
    advance(300).await;

    h.engine.set_remote_available(false).await.unwrap();
    settle().await;
    assert_eq!(h.engine.phase().await, SyncPhase::Inactive);
    assert_eq!(h.documents.active_subscriptions(&key("alice")), 0);

    advance(2_000).await;
    assert_eq!(h.documents.write_count(), 0);

    // Coming back adopts the remote cart, which never saw the edit
    h.engine.set_remote_available(true).await.unwrap();
    settle().await;
    assert!(h.engine.is_initialized().await);
    assert!(h.engine.cart().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn two_devices_converge_without_ping_pong() {
    let laptop = Harness::new();
    let phone = Harness::sharing(&laptop.documents, laptop.clock.clone());
    laptop.sign_in("alice").await;
    phone.sign_in("alice").await;

    laptop
        .engine
        .add_item(ticket("E", "T", 2_500, 1))
        .await
        .unwrap();
    settle().await;
    advance(801).await;
    assert_eq!(phone.engine.cart().await.ticket_count(), 1);

    phone
        .engine
        .update_quantity(LineKey::new("E", "T"), 3)
        .await
        .unwrap();
    settle().await;
    advance(801).await;
    assert_eq!(laptop.engine.cart().await.ticket_count(), 3);

    advance(10_000).await;
    assert_eq!(laptop.documents.write_count(), 2);
    assert!(laptop.diagnostics.is_empty());
    assert!(phone.diagnostics.is_empty());
}

#[tokio::test(start_paused = true)]
async fn expiry_follows_oldest_item() {
    let h = Harness::new();
    h.engine.add_item(ticket("E", "T", 100, 1)).await.unwrap();

    h.clock.advance(TimeDelta::seconds(14 * 60 + 59));
    let expiry = h.engine.expiry().await;
    assert!(expiry.warning);
    assert!(!expiry.expired);
    assert_eq!(expiry.formatted, "00:01");

    h.clock.advance(TimeDelta::seconds(1));
    let expiry = h.engine.expiry().await;
    assert!(expiry.expired);
    assert_eq!(expiry.remaining_ms(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_sync_and_rejects_edits() {
    let h = Harness::new();
    h.sign_in("alice").await;

    h.engine.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(h.documents.active_subscriptions(&key("alice")), 0);

    let result = h.engine.add_item(ticket("E", "T", 100, 1)).await;
    assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
}
