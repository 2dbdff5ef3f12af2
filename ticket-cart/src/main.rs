//! Ticket cart demo binary
//!
//! Runs two sessions of the same user against one in-memory document store
//! and shows edits on one device reaching the other.

use anyhow::Context;
use cart_sync_core::document_store::DocumentKey;
use cart_sync_core::environment::SystemClock;
use cart_sync_testing::InMemoryDocumentStore;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use ticket_cart::{
    AuthContext, CartDocument, CartLineItem, CartSyncEngine, CartSyncEnvironment, LineKey, Money,
    SyncConfig, TracingDiagnostics, UserId,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticket_cart=debug,cart_sync_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SyncConfig::from_env().context("loading cart sync configuration")?;
    let settle = config.debounce + Duration::from_millis(200);

    println!("=== Ticket Cart: two devices, one cart ===\n");

    let documents = InMemoryDocumentStore::<CartDocument>::new();
    let environment = |config: SyncConfig| {
        CartSyncEnvironment::new(
            Arc::new(SystemClock),
            Arc::new(documents.clone()),
            Arc::new(TracingDiagnostics),
            config,
        )
    };

    let laptop = CartSyncEngine::new(environment(config.clone()));
    let phone = CartSyncEngine::new(environment(config.clone()));
    let user = UserId::new("demo-user");

    println!(">>> Both devices sign in as {user}");
    laptop.set_auth(AuthContext::signed_in(user.clone())).await?;
    phone.set_auth(AuthContext::signed_in(user.clone())).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("Laptop phase: {:?}", laptop.phase().await);

    println!("\n>>> Laptop adds tickets in a quick burst");
    let concert = CartLineItem::new("evt-jazz", "ga", Money::from_minor(2_500), 1, Utc::now())
        .with_event("Jazz Night", "2025-03-01")
        .with_tier_name("General Admission")
        .with_venue("Blue Room");
    laptop.add_item(concert).await?;
    laptop
        .update_quantity(LineKey::new("evt-jazz", "ga"), 3)
        .await?;
    laptop
        .apply_promo_code("EARLYBIRD", Money::from_minor(500))
        .await?;

    tokio::time::sleep(settle).await;
    println!("Remote writes so far: {}", documents.write_count());

    let phone_cart = phone.cart().await;
    let totals = phone.totals().await;
    println!(
        "Phone sees {} ticket(s), promo {:?}, total {}",
        phone_cart.ticket_count(),
        phone_cart.promo_code(),
        totals.final_total
    );

    println!("\n>>> The organizer raises the price; the store pushes a new snapshot");
    let key = DocumentKey::from(&user);
    if let Some(mut document) = documents.document(&key) {
        for item in &mut document.items {
            item.price = Money::from_minor(3_000);
        }
        documents.put(&key, document);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Some(item) = laptop.cart().await.items().first() {
        println!(
            "Laptop line now {} (was {})",
            item.price,
            item.original_price.unwrap_or(item.price)
        );
    }
    println!("Remote writes so far: {}", documents.write_count());

    println!("\n>>> Cart hold");
    let mut ticks = phone.countdown().await.take(3);
    while let Some(expiry) = ticks.next().await {
        println!(
            "  {} remaining (warning: {}, expired: {})",
            expiry.formatted, expiry.warning, expiry.expired
        );
    }

    println!("\n>>> Phone signs out mid-edit");
    phone.remove_item(LineKey::new("evt-jazz", "ga")).await?;
    phone.set_auth(AuthContext::signed_out()).await?;
    tokio::time::sleep(settle).await;
    println!(
        "Remote still has {} line(s) after {} write(s)",
        documents.document(&key).map_or(0, |d| d.items.len()),
        documents.write_count()
    );

    if let Ok(json) = serde_json::to_string_pretty(&documents.document(&key)) {
        println!("\nRemote document:\n{json}");
    }

    laptop.shutdown(Duration::from_secs(1)).await?;
    phone.shutdown(Duration::from_secs(1)).await?;

    println!("\n=== Demo complete ===");
    Ok(())
}
