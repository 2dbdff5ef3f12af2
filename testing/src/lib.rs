//! # Cart Sync Testing
//!
//! Testing utilities and helpers for the cart sync architecture.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - An in-memory [`DocumentStore`](cart_sync_core::document_store::DocumentStore)
//!   with live snapshots and failure injection
//! - A fluent Given-When-Then harness for reducers
//!
//! ## Example
//!
//! ```ignore
//! use cart_sync_testing::{InMemoryDocumentStore, test_clock};
//!
//! #[tokio::test(start_paused = true)]
//! async fn writes_reach_the_store() {
//!     let documents = InMemoryDocumentStore::<CartDocument>::new();
//!     let engine = CartSyncEngine::new(env_with(documents.clone()));
//!     // ...
//!     assert_eq!(documents.write_count(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use cart_sync_core::environment::Clock;

/// In-memory document store with live snapshots
pub mod document_mocks;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use cart_sync_testing::mocks::FixedClock;
    /// use cart_sync_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when the test moves it
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the code under test.
    ///
    /// # Example
    ///
    /// ```
    /// use cart_sync_testing::mocks::ManualClock;
    /// use cart_sync_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let start = Utc::now();
    /// let clock = ManualClock::new(start);
    /// let shared = clock.clone();
    ///
    /// clock.advance(Duration::seconds(90));
    /// assert_eq!(shared.now(), start + Duration::seconds(90));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// Create a manual clock starting at 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn manual_clock() -> ManualClock {
        ManualClock::new(epoch())
    }
}

// Re-export commonly used items
pub use document_mocks::{InMemoryDocumentStore, SubscriptionEvent};
pub use mocks::{FixedClock, ManualClock, manual_clock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
