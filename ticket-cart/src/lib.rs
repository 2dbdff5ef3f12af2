//! # Ticket Cart
//!
//! Ticket cart of an event-ticketing client, kept in sync with the signed-in
//! user's remote cart document.
//!
//! This crate showcases:
//! - Explicit sync state machine (`Inactive → AwaitingFirstSnapshot → Synced`)
//! - Debounced write-back as a cancellable delay effect
//! - Live document subscription as a cancellable stream effect
//! - Loop prevention through a change-origin tag
//! - Price-change detection on snapshot adoption
//! - Cart expiry countdown
//!
//! ## Architecture
//!
//! ```text
//!   user edits ──► CartSyncReducer ──► debounce (800 ms) ──► DocumentStore::write
//!                        ▲                                          │
//!                        └────── SnapshotReceived ◄── subscribe ◄───┘
//! ```
//!
//! Adopting a snapshot tags the change as remote, and the write-back
//! observer skips remote changes. A write therefore comes back as one
//! snapshot and stops there.

pub mod auth;
pub mod cart;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod engine;
pub mod expiry;
pub mod reducer;
pub mod state;
pub mod types;

pub use auth::AuthContext;
pub use cart::{CartLineItem, CartTotals, LocalCart};
pub use config::{ConfigError, SyncConfig};
pub use diagnostics::{Diagnostic, DiagnosticSink, RecordingDiagnostics, TracingDiagnostics};
pub use document::{CartDocument, RemoteLineItem};
pub use engine::{CartSyncEngine, CartSyncStore};
pub use expiry::{CartExpiry, ExpiryPolicy, countdown, format_mm_ss};
pub use reducer::{CartSyncEnvironment, CartSyncReducer, SUBSCRIPTION, WRITE_BACK};
pub use state::{CartSyncAction, CartSyncState, ChangeOrigin, SyncPhase};
pub use types::{EventId, LineKey, Money, TierId, UserId};
