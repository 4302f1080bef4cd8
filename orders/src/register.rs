//! Registering new orders.

use helpdesk_core::document::{DocumentStore, FieldUpdate};
use std::sync::Arc;

use crate::error::{RegisterError, ValidationError};
use crate::mapper::fields;
use crate::types::{OrderId, OrderStatus};
use crate::OrdersEnvironment;

/// Creates orders in the open state
#[derive(Clone)]
pub struct OrderRegistrar {
    store: Arc<dyn DocumentStore>,
    collection: Arc<str>,
}

impl OrderRegistrar {
    /// Creates a registrar writing to `collection`
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// Creates a registrar sharing the environment's store and collection
    #[must_use]
    pub fn from_env(env: &OrdersEnvironment) -> Self {
        Self {
            store: Arc::clone(&env.store),
            collection: Arc::clone(&env.collection),
        }
    }

    /// Register a new open order and return its id.
    ///
    /// Neither `solution` nor `closed_at` is written; `created_at` is
    /// resolved by the store.
    ///
    /// # Errors
    ///
    /// - [`RegisterError::Validation`]: blank patrimony or description, the store is not called
    /// - [`RegisterError::StoreWrite`]: the write failed, nothing was created
    #[tracing::instrument(skip(self, description))]
    pub async fn register(
        &self,
        patrimony: &str,
        description: &str,
    ) -> Result<OrderId, RegisterError> {
        if patrimony.trim().is_empty() {
            return Err(ValidationError::Blank {
                field: fields::PATRIMONY,
            }
            .into());
        }
        if description.trim().is_empty() {
            return Err(ValidationError::Blank {
                field: fields::DESCRIPTION,
            }
            .into());
        }

        let order = FieldUpdate::new()
            .set(fields::PATRIMONY, patrimony)
            .set(fields::DESCRIPTION, description)
            .set(fields::STATUS, OrderStatus::Open.as_str())
            .set_server_timestamp(fields::CREATED_AT);

        let id = self
            .store
            .add_document(&self.collection, order)
            .await
            .map_err(|error| {
                tracing::error!(%error, "Failed to register order");
                RegisterError::StoreWrite(error)
            })?;

        tracing::info!(order_id = %id, "Order registered");
        Ok(OrderId::from(id))
    }
}

impl std::fmt::Debug for OrderRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderRegistrar")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}
