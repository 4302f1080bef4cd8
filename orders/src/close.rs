//! The single `open → closed` transition.

use helpdesk_core::document::{DocumentStore, FieldUpdate, Precondition, StoreError};
use std::sync::Arc;

use crate::error::{CloseError, ValidationError};
use crate::mapper::fields;
use crate::types::{OrderId, OrderStatus};
use crate::OrdersEnvironment;

/// Check a solution before anything is written.
///
/// # Errors
///
/// Returns [`ValidationError::Blank`] if `solution` is empty after trimming.
pub fn validate_solution(solution: &str) -> Result<(), ValidationError> {
    if solution.trim().is_empty() {
        return Err(ValidationError::Blank { field: "solution" });
    }
    Ok(())
}

/// Closes orders
///
/// Status, solution and closing time are written as one atomic update,
/// guarded by `status == open` so an order is closed at most once.
#[derive(Clone)]
pub struct OrderCloser {
    store: Arc<dyn DocumentStore>,
    collection: Arc<str>,
}

impl OrderCloser {
    /// Creates a closer writing to `collection`
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Creates a closer sharing the environment's store and collection
    #[must_use]
    pub fn from_env(env: &OrdersEnvironment) -> Self {
        Self {
            store: Arc::clone(&env.store),
            collection: Arc::clone(&env.collection),
        }
    }

    /// Close `id` with `solution`.
    ///
    /// The solution is stored as given; `closed_at` is resolved by the store.
    ///
    /// # Errors
    ///
    /// - [`CloseError::Validation`]: blank solution, the store is not called
    /// - [`CloseError::AlreadyClosed`]: the order is not open, nothing was written
    /// - [`CloseError::StoreWrite`]: the write failed, the order is unchanged
    #[tracing::instrument(skip(self, solution), fields(order_id = %id))]
    pub async fn close(&self, id: &OrderId, solution: &str) -> Result<(), CloseError> {
        validate_solution(solution)?;

        let update = FieldUpdate::new()
            .set(fields::STATUS, OrderStatus::Closed.as_str())
            .set(fields::SOLUTION, solution)
            .set_server_timestamp(fields::CLOSED_AT);
        let guard = Precondition::field_equals(fields::STATUS, OrderStatus::Open.as_str());

        match self
            .store
            .update_document(&self.collection, &id.document_id(), update, Some(guard))
            .await
        {
            Ok(()) => {
                tracing::info!("Order closed");
                Ok(())
            },
            Err(StoreError::PreconditionFailed { .. }) => {
                tracing::warn!("Order is not open, close rejected");
                Err(CloseError::AlreadyClosed(id.clone()))
            },
            Err(error) => {
                tracing::error!(%error, "Failed to close order");
                Err(CloseError::StoreWrite(error))
            },
        }
    }
}

impl std::fmt::Debug for OrderCloser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderCloser")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use helpdesk_core::document::{DocumentId, Timestamp};
    use helpdesk_core::environment::Clock;
    use helpdesk_testing::{test_clock, InMemoryDocumentStore, ManualClock, Operation};
    use proptest::prelude::*;

    fn seeded() -> (InMemoryDocumentStore, OrderCloser) {
        let store = InMemoryDocumentStore::new(test_clock());
        store.insert_document(
            "orders",
            "1",
            FieldUpdate::new()
                .set("patrimony", "123456")
                .set("description", "Impressora travando")
                .set("status", "open")
                .set_server_timestamp("created_at"),
        );
        let closer = OrderCloser::new(Arc::new(store.clone()), "orders");
        (store, closer)
    }

    #[tokio::test]
    async fn close_writes_all_three_fields() {
        let (store, closer) = seeded();
        closer
            .close(&OrderId::new("1"), "Replaced battery")
            .await
            .unwrap();

        let doc = store.document("orders", &DocumentId::new("1")).unwrap();
        assert_eq!(doc.get_str("status").unwrap(), Some("closed"));
        assert_eq!(doc.get_str("solution").unwrap(), Some("Replaced battery"));
        assert_eq!(
            doc.get_timestamp("closed_at").unwrap(),
            Some(Timestamp::from(test_clock().now()))
        );
        assert_eq!(store.calls().updates, 1);
    }

    #[tokio::test]
    async fn closed_at_is_stamped_at_write_time() {
        let clock = ManualClock::new(test_clock().now());
        let store = InMemoryDocumentStore::new(clock.clone());
        store.insert_document(
            "orders",
            "1",
            FieldUpdate::new()
                .set("status", "open")
                .set_server_timestamp("created_at"),
        );
        let closer = OrderCloser::new(Arc::new(store.clone()), "orders");

        clock.advance(chrono::Duration::hours(1));
        closer.close(&OrderId::new("1"), "Cabo trocado").await.unwrap();

        let doc = store.document("orders", &DocumentId::new("1")).unwrap();
        let created = doc.get_timestamp("created_at").unwrap().unwrap();
        let closed = doc.get_timestamp("closed_at").unwrap().unwrap();
        assert_eq!(closed.seconds() - created.seconds(), 3600);
        assert_eq!(closed, Timestamp::from(clock.now()));
    }

    #[tokio::test]
    async fn second_close_is_rejected() {
        let (store, closer) = seeded();
        let id = OrderId::new("1");
        closer.close(&id, "first").await.unwrap();

        let err = closer.close(&id, "second").await.unwrap_err();
        assert_eq!(err, CloseError::AlreadyClosed(id));

        let doc = store.document("orders", &DocumentId::new("1")).unwrap();
        assert_eq!(doc.get_str("solution").unwrap(), Some("first"));
    }

    #[tokio::test]
    async fn store_failure_is_reported_verbatim() {
        let (store, closer) = seeded();
        store.fail(Operation::Update, StoreError::PermissionDenied("rules".into()));

        let err = closer.close(&OrderId::new("1"), "fixed").await.unwrap_err();
        assert_eq!(
            err,
            CloseError::StoreWrite(StoreError::PermissionDenied("rules".into()))
        );
        assert_eq!(err.user_message(), "Não foi possível encerrar a solicitação.");

        let doc = store.document("orders", &DocumentId::new("1")).unwrap();
        assert_eq!(doc.get_str("status").unwrap(), Some("open"));
        assert_eq!(doc.get_str("solution").unwrap(), None);
    }

    #[tokio::test]
    async fn missing_order_is_a_store_write_error() {
        let (_, closer) = seeded();
        let err = closer.close(&OrderId::new("404"), "fixed").await.unwrap_err();
        assert!(matches!(
            err,
            CloseError::StoreWrite(StoreError::NotFound { .. })
        ));
    }

    proptest! {
        #[test]
        fn whitespace_solutions_never_reach_the_store(solution in "[ \t\n\r]{0,12}") {
            let (store, closer) = seeded();
            let result = tokio_test::block_on(closer.close(&OrderId::new("1"), &solution));

            prop_assert!(matches!(result, Err(CloseError::Validation(_))));
            prop_assert_eq!(store.calls().total(), 0);
        }

        #[test]
        fn any_non_blank_solution_is_valid(solution in "[ ]{0,3}[a-zA-Z0-9][ a-zA-Z0-9]{0,20}") {
            prop_assert!(validate_solution(&solution).is_ok());
        }
    }
}
