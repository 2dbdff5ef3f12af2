//! `CartSyncEngine`: the cart as the rest of the application sees it.
//!
//! Wraps a [`Store`] running the [`CartSyncReducer`] and exposes the cart
//! mutators, auth/availability inputs and read accessors as plain async
//! methods.

use crate::auth::AuthContext;
use crate::cart::{CartLineItem, CartTotals, LocalCart};
use crate::expiry::{CartExpiry, countdown};
use crate::reducer::{CartSyncEnvironment, CartSyncReducer};
use crate::state::{CartSyncAction, CartSyncState, SyncPhase};
use crate::types::{LineKey, Money};
use cart_sync_runtime::{Store, StoreError};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Store type behind the engine
pub type CartSyncStore = Store<CartSyncState, CartSyncAction, CartSyncEnvironment, CartSyncReducer>;

/// Local cart kept in sync with the signed-in user's remote cart
///
/// Clones share the same store.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use ticket_cart::*;
/// use cart_sync_core::environment::SystemClock;
/// use cart_sync_testing::InMemoryDocumentStore;
///
/// # async fn example() -> Result<(), cart_sync_runtime::StoreError> {
/// let engine = CartSyncEngine::new(CartSyncEnvironment::new(
///     Arc::new(SystemClock),
///     Arc::new(InMemoryDocumentStore::<CartDocument>::new()),
///     Arc::new(TracingDiagnostics),
///     SyncConfig::default(),
/// ));
///
/// engine.set_auth(AuthContext::signed_in("user-42")).await?;
/// engine
///     .add_item(CartLineItem::new("evt-1", "ga", Money::from_minor(2_500), 2, chrono::Utc::now()))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CartSyncEngine {
    store: CartSyncStore,
}

impl CartSyncEngine {
    /// Creates an inactive engine with an empty cart
    ///
    /// Nothing is subscribed until [`set_auth`](Self::set_auth) reports a
    /// signed-in user.
    #[must_use]
    pub fn new(environment: CartSyncEnvironment) -> Self {
        let cart = LocalCart::new(environment.config.tax_rate_bps);
        Self::with_state(CartSyncState::new(cart), environment)
    }

    /// Creates an engine from an existing state
    #[must_use]
    pub fn with_state(state: CartSyncState, environment: CartSyncEnvironment) -> Self {
        Self {
            store: Store::new(state, CartSyncReducer::new(), environment),
        }
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &CartSyncStore {
        &self.store
    }

    /// Send a raw action
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn send(&self, action: CartSyncAction) -> Result<(), StoreError> {
        self.store.send(action).await.map(|_| ())
    }

    // ========== Local edits ==========

    /// Add tickets, merging into an existing line for the same tier
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn add_item(&self, item: CartLineItem) -> Result<(), StoreError> {
        self.send(CartSyncAction::AddItem { item }).await
    }

    /// Remove a line
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn remove_item(&self, key: LineKey) -> Result<(), StoreError> {
        self.send(CartSyncAction::RemoveItem { key }).await
    }

    /// Set a line's quantity; zero removes the line
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn update_quantity(&self, key: LineKey, quantity: u32) -> Result<(), StoreError> {
        self.send(CartSyncAction::UpdateQuantity { key, quantity })
            .await
    }

    /// Apply a promo code and its discount
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn apply_promo_code(
        &self,
        code: impl Into<String>,
        discount: Money,
    ) -> Result<(), StoreError> {
        self.send(CartSyncAction::ApplyPromoCode {
            code: code.into(),
            discount,
        })
        .await
    }

    /// Remove the promo code
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn remove_promo_code(&self) -> Result<(), StoreError> {
        self.send(CartSyncAction::RemovePromoCode).await
    }

    /// Empty the cart
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn clear_cart(&self) -> Result<(), StoreError> {
        self.send(CartSyncAction::ClearCart).await
    }

    // ========== Environment changes ==========

    /// Report a new auth state
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn set_auth(&self, auth: AuthContext) -> Result<(), StoreError> {
        self.send(CartSyncAction::AuthChanged { auth }).await
    }

    /// Report whether remote storage can be used
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn set_remote_available(&self, available: bool) -> Result<(), StoreError> {
        self.send(CartSyncAction::RemoteAvailabilityChanged { available })
            .await
    }

    // ========== Reads ==========

    /// Copy of the local cart
    pub async fn cart(&self) -> LocalCart {
        self.store.state(|s| s.cart.clone()).await
    }

    /// Current totals
    pub async fn totals(&self) -> CartTotals {
        self.store.state(|s| s.cart.totals()).await
    }

    /// Current lifecycle phase
    pub async fn phase(&self) -> SyncPhase {
        self.store.state(|s| s.phase.clone()).await
    }

    /// Whether the first snapshot for the current user has been adopted
    pub async fn is_initialized(&self) -> bool {
        self.store.state(CartSyncState::is_initialized).await
    }

    /// Expiry of the cart right now
    pub async fn expiry(&self) -> CartExpiry {
        let oldest = self.store.state(|s| s.cart.oldest_added_at()).await;
        let env = self.store.environment();
        CartExpiry::compute(oldest, env.clock.now(), &env.config.expiry)
    }

    /// Countdown for the cart as it is now
    ///
    /// The stream follows the oldest line at the time of the call; call again
    /// after the cart changes.
    pub async fn countdown(&self) -> Pin<Box<dyn Stream<Item = CartExpiry> + Send>> {
        let oldest = self.store.state(|s| s.cart.oldest_added_at()).await;
        let env = self.store.environment();
        Box::pin(countdown(
            Arc::clone(&env.clock),
            oldest,
            env.config.expiry,
            env.config.countdown_tick,
        ))
    }

    /// Actions produced by the engine's effects (snapshots, timers, write results)
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<CartSyncAction> {
        self.store.subscribe_actions()
    }

    /// Stop syncing and shut the store down
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// when `timeout` elapses.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        if let Err(error) = self.send(CartSyncAction::Teardown).await {
            tracing::debug!(error = %error, "Teardown skipped");
        }
        self.store.shutdown(timeout).await
    }
}

impl std::fmt::Debug for CartSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSyncEngine").finish_non_exhaustive()
    }
}
