//! # Helpdesk Testing
//!
//! Testing utilities and helpers for the helpdesk.
//!
//! This crate provides:
//! - Deterministic clocks for the `Clock` environment trait
//! - [`InMemoryDocumentStore`]: a live-query document store with fault injection
//! - [`ReducerTest`]: Given-When-Then reducer tests
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use helpdesk_testing::{test_clock, InMemoryDocumentStore};
//!
//! #[tokio::test]
//! async fn lists_open_orders() {
//!     let store = InMemoryDocumentStore::new(test_clock());
//!     store.insert_document("orders", "1", open_order_fields());
//!
//!     let list = list_store(store.clone());
//!     list.send(OrderListAction::Subscribe { filter: OrderStatus::Open })?;
//! }
//! ```

use chrono::{DateTime, Utc};
use helpdesk_core::environment::Clock;

/// In-memory document store
pub mod in_memory;

/// Fluent reducer tests
pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use helpdesk_testing::mocks::FixedClock;
    /// use helpdesk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
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

    /// Clock that only moves when told to
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the store under test.
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

        /// Move the clock to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            match self.time.lock() {
                Ok(mut current) => *current = time,
                Err(poisoned) => *poisoned.into_inner() = time,
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let next = self.now() + by;
            self.set(next);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            match self.time.lock() {
                Ok(current) => *current,
                Err(poisoned) => *poisoned.into_inner(),
            }
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use in_memory::{CallCounts, InMemoryDocumentStore, Operation};
pub use mocks::{test_clock, FixedClock, ManualClock};
pub use reducer_test::{assertions, ReducerTest};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn test_manual_clock_advances_all_clones() {
        let clock = ManualClock::new(test_clock().now());
        let shared = clock.clone();
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(
            shared.now(),
            test_clock().now() + chrono::Duration::minutes(5)
        );
    }
}
