//! Cart sync reducer.
//!
//! Keeps the local cart and the user's remote cart document consistent:
//!
//! - **Remote → local**: every snapshot replaces the local cart wholesale,
//!   flagging lines whose price moved.
//! - **Local → remote**: user edits restart a debounce timer; when it elapses
//!   the whole cart is written back as a full replace.
//!
//! Adopting a snapshot marks the change as [`ChangeOrigin::Remote`]; the
//! write-back observer consumes that mark instead of scheduling a write, so
//! an adopted snapshot is never echoed back.

use crate::config::SyncConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::document::CartDocument;
use crate::state::{CartSyncAction, CartSyncState, ChangeOrigin, SyncPhase};
use crate::types::{LineKey, Money, UserId};
use cart_sync_core::document_store::{DocumentKey, DocumentStore, Snapshot};
use cart_sync_core::effect::{Effect, EffectId};
use cart_sync_core::environment::Clock;
use cart_sync_core::reducer::Reducer;
use cart_sync_core::{async_effect, debounce, smallvec, SmallVec};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;

/// Cancellation id of the live document subscription
pub const SUBSCRIPTION: EffectId = EffectId::from_static("cart-sync/subscription");

/// Cancellation id of the pending write-back timer
pub const WRITE_BACK: EffectId = EffectId::from_static("cart-sync/write-back");

type Effects = SmallVec<[Effect<CartSyncAction>; 4]>;

/// Environment for the cart sync engine
#[derive(Clone)]
pub struct CartSyncEnvironment {
    /// Clock for `added_at` defaults and expiry
    pub clock: Arc<dyn Clock>,
    /// Remote cart documents, one per user
    pub documents: Arc<dyn DocumentStore<CartDocument>>,
    /// Receiver of price-change and failure reports
    pub diagnostics: Arc<dyn DiagnosticSink>,
    /// Timings and tax rate
    pub config: SyncConfig,
}

impl CartSyncEnvironment {
    /// Creates a new environment
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        documents: Arc<dyn DocumentStore<CartDocument>>,
        diagnostics: Arc<dyn DiagnosticSink>,
        config: SyncConfig,
    ) -> Self {
        Self {
            clock,
            documents,
            diagnostics,
            config,
        }
    }

    fn report(&self, diagnostic: Diagnostic) {
        metrics::counter!("cart_sync.diagnostics", "kind" => diagnostic.kind()).increment(1);
        self.diagnostics.report(diagnostic);
    }
}

impl std::fmt::Debug for CartSyncEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSyncEnvironment")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Reducer implementing the cart sync protocol
#[derive(Clone, Copy, Debug, Default)]
pub struct CartSyncReducer;

impl CartSyncReducer {
    /// Creates a new cart sync reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Re-evaluates which user's document should be subscribed
    ///
    /// A change of user always tears the old subscription down first; the
    /// runtime waits for the cancelled subscription to finish before the new
    /// one starts.
    fn reconcile_activation(state: &mut CartSyncState, env: &CartSyncEnvironment) -> Effects {
        let desired = state.desired_user().cloned();
        if desired.as_ref() == state.phase.user_id() {
            return smallvec![Effect::None];
        }

        let mut effects = if state.phase == SyncPhase::Inactive {
            Effects::new()
        } else {
            Self::deactivate(state)
        };

        if let Some(user_id) = desired {
            tracing::info!(user_id = %user_id, "Starting cart sync");
            metrics::counter!("cart_sync.activations").increment(1);
            effects.push(Self::subscription(env, user_id.clone()).cancellable(SUBSCRIPTION));
            state.phase = SyncPhase::AwaitingFirstSnapshot { user_id };
        }

        effects
    }

    /// Moves to `Inactive`, cancelling the timer and the subscription
    fn deactivate(state: &mut CartSyncState) -> Effects {
        if let Some(user_id) = state.phase.user_id() {
            tracing::info!(user_id = %user_id, "Stopping cart sync");
        }
        state.phase = SyncPhase::Inactive;
        state.last_change_origin = ChangeOrigin::Local;
        state.pending_write = None;

        smallvec![Effect::Cancel(WRITE_BACK), Effect::Cancel(SUBSCRIPTION)]
    }

    /// Live subscription to `user_id`'s document, fed back as actions
    fn subscription(env: &CartSyncEnvironment, user_id: UserId) -> Effect<CartSyncAction> {
        let documents = Arc::clone(&env.documents);

        Effect::Stream(Box::pin(async_stream::stream! {
            let key = DocumentKey::from(&user_id);
            match documents.subscribe(&key).await {
                Ok(mut snapshots) => {
                    tracing::debug!(user_id = %user_id, "Cart subscription open");
                    while let Some(next) = snapshots.next().await {
                        yield match next {
                            Ok(snapshot) => CartSyncAction::SnapshotReceived {
                                user_id: user_id.clone(),
                                snapshot,
                            },
                            Err(error) => CartSyncAction::SubscriptionFailed {
                                user_id: user_id.clone(),
                                error,
                            },
                        };
                    }
                    tracing::debug!(user_id = %user_id, "Cart subscription ended");
                },
                Err(error) => {
                    yield CartSyncAction::SubscriptionFailed { user_id, error };
                },
            }
        }))
    }

    /// Replaces the local cart with `snapshot`
    fn adopt_snapshot(
        state: &mut CartSyncState,
        user_id: UserId,
        snapshot: Snapshot<CartDocument>,
        env: &CartSyncEnvironment,
    ) {
        state.last_change_origin = ChangeOrigin::Remote;

        let previous_prices: HashMap<LineKey, Money> = state
            .cart
            .items()
            .iter()
            .map(|item| (item.key(), item.price))
            .collect();

        state.cart.clear();

        if let Some(document) = snapshot.into_document() {
            let now = env.clock.now();
            let has_promotion = document.has_promotion();
            let discount = document.discount_or_zero();

            for remote in document.items {
                let mut item = remote.into_line_item(now);
                if let Some(&old_price) = previous_prices.get(&item.key()) {
                    if old_price != item.price {
                        item.original_price = Some(old_price);
                        env.report(Diagnostic::PriceChanged {
                            event_id: item.event_id.clone(),
                            tier_id: item.tier_id.clone(),
                            old_price,
                            new_price: item.price,
                        });
                    }
                }
                state.cart.add_item(item);
            }

            if has_promotion {
                state
                    .cart
                    .set_promo_code(document.promo_code.unwrap_or_default(), discount);
            }
        }

        if !state.phase.is_synced() {
            tracing::info!(user_id = %user_id, items = state.cart.items().len(), "Cart synced");
        }
        metrics::counter!("cart_sync.snapshots.adopted").increment(1);
        state.phase = SyncPhase::Synced { user_id };
    }

    /// Write-back observer, run after every change to the local cart
    fn observe_change(state: &mut CartSyncState, env: &CartSyncEnvironment) -> Effects {
        if !state.is_initialized() || state.desired_user().is_none() {
            return smallvec![Effect::None];
        }

        if state.last_change_origin == ChangeOrigin::Remote {
            state.last_change_origin = ChangeOrigin::Local;
            if state.pending_write.take().is_some() {
                tracing::debug!("Remote snapshot superseded pending write-back");
            }
            return smallvec![Effect::Cancel(WRITE_BACK)];
        }

        state.write_generation += 1;
        let generation = state.write_generation;
        state.pending_write = Some(generation);
        tracing::trace!(generation, "Write-back scheduled");

        smallvec![debounce! {
            id: WRITE_BACK,
            duration: env.config.debounce,
            action: CartSyncAction::WriteBackDue { generation }
        }]
    }

    /// Writes the whole cart to the active user's document
    fn write_back(state: &mut CartSyncState, generation: u64, env: &CartSyncEnvironment) -> Effects {
        if state.pending_write != Some(generation) {
            tracing::trace!(generation, "Ignoring stale write-back timer");
            return smallvec![Effect::None];
        }
        state.pending_write = None;

        let user_id = match (&state.phase, state.desired_user()) {
            (SyncPhase::Synced { user_id }, Some(active)) if user_id == active => user_id.clone(),
            _ => return smallvec![Effect::None],
        };

        let document = CartDocument::from_cart(&state.cart);
        let documents = Arc::clone(&env.documents);
        tracing::debug!(
            user_id = %user_id,
            items = document.items.len(),
            generation,
            "Writing cart"
        );

        smallvec![async_effect! {
            let key = DocumentKey::from(&user_id);
            match documents.write(&key, document).await {
                Ok(()) => Some(CartSyncAction::WriteCompleted { user_id }),
                Err(error) => Some(CartSyncAction::WriteFailed { user_id, error }),
            }
        }]
    }
}

impl Reducer for CartSyncReducer {
    type State = CartSyncState;
    type Action = CartSyncAction;
    type Environment = CartSyncEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Local edits ==========
            CartSyncAction::AddItem { item } => {
                state.cart.add_item(item);
                state.last_change_origin = ChangeOrigin::Local;
                Self::observe_change(state, env)
            },
            CartSyncAction::RemoveItem { key } => {
                if !state.cart.remove_item(&key) {
                    return smallvec![Effect::None];
                }
                state.last_change_origin = ChangeOrigin::Local;
                Self::observe_change(state, env)
            },
            CartSyncAction::UpdateQuantity { key, quantity } => {
                if !state.cart.update_quantity(&key, quantity) {
                    return smallvec![Effect::None];
                }
                state.last_change_origin = ChangeOrigin::Local;
                Self::observe_change(state, env)
            },
            CartSyncAction::ApplyPromoCode { code, discount } => {
                state.cart.set_promo_code(code, discount);
                state.last_change_origin = ChangeOrigin::Local;
                Self::observe_change(state, env)
            },
            CartSyncAction::RemovePromoCode => {
                if !state.cart.remove_promo_code() {
                    return smallvec![Effect::None];
                }
                state.last_change_origin = ChangeOrigin::Local;
                Self::observe_change(state, env)
            },
            CartSyncAction::ClearCart => {
                if state.cart.is_empty() && state.cart.promo_code().is_none() {
                    return smallvec![Effect::None];
                }
                state.cart.clear();
                state.last_change_origin = ChangeOrigin::Local;
                Self::observe_change(state, env)
            },

            // ========== Environment changes ==========
            CartSyncAction::AuthChanged { auth } => {
                state.auth = auth;
                Self::reconcile_activation(state, env)
            },
            CartSyncAction::RemoteAvailabilityChanged { available } => {
                state.remote_available = available;
                Self::reconcile_activation(state, env)
            },
            CartSyncAction::Teardown => {
                if state.phase == SyncPhase::Inactive {
                    return smallvec![Effect::None];
                }
                Self::deactivate(state)
            },

            // ========== Effect feedback ==========
            CartSyncAction::SnapshotReceived { user_id, snapshot } => {
                if state.phase.user_id() != Some(&user_id) {
                    tracing::debug!(user_id = %user_id, "Dropping snapshot for inactive user");
                    return smallvec![Effect::None];
                }
                Self::adopt_snapshot(state, user_id, snapshot, env);
                Self::observe_change(state, env)
            },
            CartSyncAction::SubscriptionFailed { user_id, error } => {
                if state.phase.user_id() == Some(&user_id) {
                    env.report(Diagnostic::SubscriptionFailed { user_id, error });
                }
                smallvec![Effect::None]
            },
            CartSyncAction::WriteBackDue { generation } => {
                Self::write_back(state, generation, env)
            },
            CartSyncAction::WriteCompleted { user_id } => {
                tracing::debug!(user_id = %user_id, "Cart written");
                metrics::counter!("cart_sync.writes.completed").increment(1);
                smallvec![Effect::None]
            },
            CartSyncAction::WriteFailed { user_id, error } => {
                metrics::counter!("cart_sync.writes.failed").increment(1);
                env.report(Diagnostic::WriteFailed { user_id, error });
                smallvec![Effect::None]
            },
        }
    }
}
