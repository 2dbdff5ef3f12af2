//! Sync state machine and actions.

use crate::auth::AuthContext;
use crate::cart::{CartLineItem, LocalCart};
use crate::document::CartDocument;
use crate::types::{LineKey, Money, UserId};
use cart_sync_core::document_store::{DocumentStoreError, Snapshot};

/// Where the sync engine is in its lifecycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SyncPhase {
    /// No user, not authenticated, or remote storage unavailable
    #[default]
    Inactive,
    /// Subscribed to the user's cart, first snapshot not yet received.
    /// Write-back is suppressed so a transient local cart cannot overwrite
    /// the real remote one.
    AwaitingFirstSnapshot {
        /// Owner of the subscribed document
        user_id: UserId,
    },
    /// First snapshot adopted; local changes are written back
    Synced {
        /// Owner of the subscribed document
        user_id: UserId,
    },
}

impl SyncPhase {
    /// The user whose document is subscribed, if any
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Inactive => None,
            Self::AwaitingFirstSnapshot { user_id } | Self::Synced { user_id } => Some(user_id),
        }
    }

    /// Whether the first snapshot has been adopted
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }
}

/// What caused the most recent change to the local cart
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A user edit
    #[default]
    Local,
    /// Adoption of a remote snapshot; must not be written back
    Remote,
}

/// State owned by the sync engine's store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartSyncState {
    /// The local cart
    pub cart: LocalCart,
    /// Latest auth state
    pub auth: AuthContext,
    /// Whether the remote document store can be used
    pub remote_available: bool,
    /// Lifecycle phase
    pub phase: SyncPhase,
    /// Origin of the latest cart change
    pub last_change_origin: ChangeOrigin,
    /// Generation of the most recently scheduled write-back
    pub write_generation: u64,
    /// Generation of the write-back timer still pending, if any
    pub pending_write: Option<u64>,
}

impl Default for CartSyncState {
    fn default() -> Self {
        Self::new(LocalCart::default())
    }
}

impl CartSyncState {
    /// Inactive state around `cart`, with remote storage assumed available
    #[must_use]
    pub const fn new(cart: LocalCart) -> Self {
        Self {
            cart,
            auth: AuthContext::signed_out(),
            remote_available: true,
            phase: SyncPhase::Inactive,
            last_change_origin: ChangeOrigin::Local,
            write_generation: 0,
            pending_write: None,
        }
    }

    /// The user whose cart should be synced right now
    #[must_use]
    pub fn desired_user(&self) -> Option<&UserId> {
        self.auth.active_user().filter(|_| self.remote_available)
    }

    /// Whether the first snapshot for the current user has been adopted
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.phase.is_synced()
    }
}

/// Everything that can happen to the sync engine
#[derive(Clone, Debug, PartialEq)]
pub enum CartSyncAction {
    // Local edits
    /// Add a line, merging into an existing `(event, tier)` line
    AddItem {
        /// The line to add
        item: CartLineItem,
    },
    /// Remove a line
    RemoveItem {
        /// Line to remove
        key: LineKey,
    },
    /// Set a line's quantity; zero removes it
    UpdateQuantity {
        /// Line to update
        key: LineKey,
        /// New quantity
        quantity: u32,
    },
    /// Apply a promo code
    ApplyPromoCode {
        /// The code
        code: String,
        /// Discount it grants
        discount: Money,
    },
    /// Remove the promo code
    RemovePromoCode,
    /// Empty the cart
    ClearCart,

    // Environment changes
    /// Auth state changed
    AuthChanged {
        /// New auth state
        auth: AuthContext,
    },
    /// Remote storage became available or unavailable
    RemoteAvailabilityChanged {
        /// Whether it can be used
        available: bool,
    },
    /// Stop syncing (the session is going away)
    Teardown,

    // Effect feedback
    /// A snapshot arrived on the subscription for `user_id`
    SnapshotReceived {
        /// Owner of the document
        user_id: UserId,
        /// Current document
        snapshot: Snapshot<CartDocument>,
    },
    /// The subscription for `user_id` reported an error
    SubscriptionFailed {
        /// Owner of the document
        user_id: UserId,
        /// The error
        error: DocumentStoreError,
    },
    /// A write-back timer elapsed
    WriteBackDue {
        /// Generation the timer was scheduled with
        generation: u64,
    },
    /// A write-back was applied
    WriteCompleted {
        /// Owner of the document
        user_id: UserId,
    },
    /// A write-back failed
    WriteFailed {
        /// Owner of the document
        user_id: UserId,
        /// The error
        error: DocumentStoreError,
    },
}
