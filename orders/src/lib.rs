//! Service-order synchronisation and lifecycle.
//!
//! Orders are equipment tickets that move through a single transition,
//! `open → closed`. This crate keeps a live, filterable list of them in sync
//! with the document store, loads one order for the detail screen, closes
//! orders and registers new ones.
//!
//! # Components
//!
//! - [`format`]: timestamps as `DD/MM/YYYY às HH:mm`
//! - [`mapper`]: stored documents to [`Order`] and view models
//! - [`list`]: [`OrderListReducer`], the live list for one status filter
//! - [`detail`]: [`OrderDetailLoader`] and [`OrderDetailReducer`]
//! - [`close`]: [`OrderCloser`], the atomic close
//! - [`register`]: [`OrderRegistrar`], new open orders
//!
//! # Example Usage
//!
//! ```no_run
//! use helpdesk_orders::{OrderListAction, OrderListReducer, OrderListState, OrderStatus, OrdersEnvironment};
//! use helpdesk_runtime::Store;
//! use helpdesk_testing::{test_clock, InMemoryDocumentStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let env = OrdersEnvironment::new(Arc::new(InMemoryDocumentStore::new(test_clock())));
//! let list = Store::new(OrderListState::default(), OrderListReducer::new(), env);
//!
//! list.send(OrderListAction::Subscribe { filter: OrderStatus::Open })?;
//!
//! let mut states = list.watch();
//! states.wait_for(|s| !s.loading).await?;
//! println!("{} open orders", list.state(OrderListState::count));
//! # Ok(())
//! # }
//! ```

use chrono::FixedOffset;
use helpdesk_core::document::DocumentStore;
use std::sync::Arc;

pub mod close;
pub mod config;
pub mod detail;
pub mod error;
pub mod format;
pub mod list;
pub mod mapper;
pub mod register;
pub mod types;

pub use close::OrderCloser;
pub use config::Config;
pub use detail::{OrderDetailAction, OrderDetailLoader, OrderDetailReducer, OrderDetailState};
pub use error::{CloseError, ConfigError, ListError, LoadError, MappingError, RegisterError, ValidationError};
pub use list::{ListPresentation, OrderListAction, OrderListReducer, OrderListState};
pub use register::OrderRegistrar;
pub use types::{Order, OrderDetail, OrderId, OrderListItem, OrderStatus, StatusFilter};

/// Dependencies shared by the order reducers
#[derive(Clone)]
pub struct OrdersEnvironment {
    /// Document store holding the orders
    pub store: Arc<dyn DocumentStore>,
    /// Collection name
    pub collection: Arc<str>,
    /// Offset timestamps are displayed in
    pub display_offset: FixedOffset,
}

impl OrdersEnvironment {
    /// Environment for the `orders` collection displayed in UTC-03:00
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            collection: Arc::from("orders"),
            display_offset: format::default_display_offset(),
        }
    }

    /// Environment from configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn from_config(store: Arc<dyn DocumentStore>, config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            collection: Arc::from(config.orders_collection.as_str()),
            display_offset: config.display_offset()?,
        })
    }

    /// Loader over this environment
    #[must_use]
    pub fn loader(&self) -> OrderDetailLoader {
        OrderDetailLoader::from_env(self)
    }

    /// Closer over this environment
    #[must_use]
    pub fn closer(&self) -> OrderCloser {
        OrderCloser::from_env(self)
    }

    /// Registrar over this environment
    #[must_use]
    pub fn registrar(&self) -> OrderRegistrar {
        OrderRegistrar::from_env(self)
    }
}

impl std::fmt::Debug for OrdersEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdersEnvironment")
            .field("collection", &self.collection)
            .field("display_offset", &self.display_offset)
            .finish_non_exhaustive()
    }
}
