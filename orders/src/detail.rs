//! Order detail: one-shot load and the close flow.
//!
//! [`OrderDetailLoader`] fetches and maps a single order. [`OrderDetailReducer`]
//! drives the detail screen around it: the load is registered under
//! [`DETAIL_LOAD`] so leaving the screen cancels it, and a successful close
//! triggers a fresh load instead of patching the shown detail.

use chrono::FixedOffset;
use helpdesk_core::document::{DocumentStore, StoreError};
use helpdesk_core::effect::{Effect, EffectId};
use helpdesk_core::reducer::Reducer;
use helpdesk_core::{async_effect, delay, smallvec, SmallVec};
use std::sync::Arc;
use std::time::Duration;

use crate::close::{validate_solution, OrderCloser};
use crate::error::{CloseError, LoadError};
use crate::mapper::to_detail;
use crate::types::{OrderDetail, OrderId};
use crate::OrdersEnvironment;

/// Registration id of the in-flight detail load
pub const DETAIL_LOAD: &str = "order-detail-load";

/// Registration id of the notice timer
pub const DETAIL_NOTICE: &str = "order-detail-notice";

/// Shown after a successful close
pub const CLOSED_NOTICE: &str = "Solicitação encerrada.";

/// How long [`CLOSED_NOTICE`] stays up
pub const NOTICE_DURATION: Duration = Duration::from_secs(3);

/// Loads a single order
#[derive(Clone)]
pub struct OrderDetailLoader {
    store: Arc<dyn DocumentStore>,
    collection: Arc<str>,
    display_offset: FixedOffset,
}

impl OrderDetailLoader {
    /// Creates a loader reading from `collection`
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<Arc<str>>,
        display_offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            display_offset,
        }
    }

    /// Creates a loader sharing the environment's store, collection and offset
    #[must_use]
    pub fn from_env(env: &OrdersEnvironment) -> Self {
        Self {
            store: Arc::clone(&env.store),
            collection: Arc::clone(&env.collection),
            display_offset: env.display_offset,
        }
    }

    /// Fetch `id` once and map it.
    ///
    /// Each call owns its result; concurrent loads do not share state.
    ///
    /// # Errors
    ///
    /// - [`LoadError::NotFound`]: no such order
    /// - [`LoadError::Read`]: the read failed
    /// - [`LoadError::Mapping`]: the stored document is malformed
    #[tracing::instrument(skip(self), fields(order_id = %id))]
    pub async fn load(&self, id: &OrderId) -> Result<OrderDetail, LoadError> {
        let doc = match self
            .store
            .get_document(&self.collection, &id.document_id())
            .await
        {
            Ok(Some(doc)) => doc,
            Ok(None) | Err(StoreError::NotFound { .. }) => {
                tracing::debug!("Order not found");
                return Err(LoadError::NotFound(id.clone()));
            },
            Err(error) => {
                tracing::error!(%error, "Failed to read order");
                return Err(LoadError::Read(error));
            },
        };

        to_detail(&doc, &self.display_offset).map_err(|error| {
            tracing::warn!(%error, "Stored order is malformed");
            LoadError::Mapping(error)
        })
    }
}

impl std::fmt::Debug for OrderDetailLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderDetailLoader")
            .field("collection", &self.collection)
            .field("display_offset", &self.display_offset)
            .finish_non_exhaustive()
    }
}

/// State of the detail screen
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderDetailState {
    /// Order being shown
    pub order_id: Option<OrderId>,
    /// A load is in flight
    pub loading: bool,
    /// Last loaded detail
    pub detail: Option<OrderDetail>,
    /// Load failure
    pub error: Option<LoadError>,
    /// A close is in flight
    pub closing: bool,
    /// Close failure
    pub close_error: Option<CloseError>,
    /// Transient message for the user
    pub notice: Option<&'static str>,
    /// Bumped on every load and dismiss; results for older requests are dropped
    pub request: u64,
}

impl OrderDetailState {
    /// Whether the close action should be offered right now
    #[must_use]
    pub fn can_close(&self) -> bool {
        !self.loading && !self.closing && self.detail.as_ref().is_some_and(OrderDetail::can_close)
    }

    /// Whether the last load found nothing
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.error, Some(LoadError::NotFound(_)))
    }
}

/// Actions for the detail screen
#[derive(Clone, Debug)]
pub enum OrderDetailAction {
    /// Load `order_id`, replacing whatever is shown
    Load {
        /// Order to show
        order_id: OrderId,
    },
    /// Load finished
    Loaded {
        /// Request that produced it
        request: u64,
        /// Mapped order
        detail: OrderDetail,
    },
    /// Load failed
    LoadFailed {
        /// Request that produced it
        request: u64,
        /// Failure
        error: LoadError,
    },
    /// User left the screen
    Dismiss,
    /// Close the shown order
    Close {
        /// Solution text as typed
        solution: String,
    },
    /// Close was written
    CloseSucceeded {
        /// Request that issued it
        request: u64,
    },
    /// Close was rejected or failed
    CloseFailed {
        /// Request that issued it
        request: u64,
        /// Failure
        error: CloseError,
    },
    /// The closed notice timed out
    NoticeExpired,
}

/// Reducer for the detail screen
#[derive(Clone, Debug, Default)]
pub struct OrderDetailReducer;

impl OrderDetailReducer {
    /// Creates a new detail reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn load(env: &OrdersEnvironment, order_id: OrderId, request: u64) -> Effect<OrderDetailAction> {
        let loader = OrderDetailLoader::from_env(env);
        let fetch = async_effect! {
            match loader.load(&order_id).await {
                Ok(detail) => Some(OrderDetailAction::Loaded { request, detail }),
                Err(error) => Some(OrderDetailAction::LoadFailed { request, error }),
            }
        };
        fetch.cancellable(DETAIL_LOAD)
    }

    fn start_load(
        state: &mut OrderDetailState,
        env: &OrdersEnvironment,
        order_id: OrderId,
    ) -> Effect<OrderDetailAction> {
        state.request += 1;
        state.order_id = Some(order_id.clone());
        state.loading = true;
        state.error = None;
        Self::load(env, order_id, state.request)
    }
}

impl Reducer for OrderDetailReducer {
    type State = OrderDetailState;
    type Action = OrderDetailAction;
    type Environment = OrdersEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            OrderDetailAction::Load { order_id } => {
                state.detail = None;
                state.closing = false;
                state.close_error = None;
                state.notice = None;
                smallvec![Self::start_load(state, env, order_id)]
            },

            OrderDetailAction::Loaded { request, detail } => {
                if request != state.request {
                    tracing::debug!(request, current = state.request, "Dropping stale detail");
                    return smallvec![Effect::None];
                }
                state.loading = false;
                state.detail = Some(detail);
                smallvec![Effect::None]
            },

            OrderDetailAction::LoadFailed { request, error } => {
                if request != state.request {
                    return smallvec![Effect::None];
                }
                state.loading = false;
                state.error = Some(error);
                smallvec![Effect::None]
            },

            OrderDetailAction::Dismiss => {
                let request = state.request + 1;
                *state = OrderDetailState {
                    request,
                    ..OrderDetailState::default()
                };
                smallvec![
                    Effect::Cancel(EffectId::new(DETAIL_LOAD)),
                    Effect::Cancel(EffectId::new(DETAIL_NOTICE)),
                ]
            },

            OrderDetailAction::Close { solution } => {
                if state.closing {
                    return smallvec![Effect::None];
                }
                let Some(order_id) = state.order_id.clone() else {
                    return smallvec![Effect::None];
                };
                if let Err(error) = validate_solution(&solution) {
                    state.close_error = Some(CloseError::Validation(error));
                    return smallvec![Effect::None];
                }
                if !state.can_close() {
                    tracing::warn!(%order_id, "Close requested for an order that cannot be closed");
                    return smallvec![Effect::None];
                }

                state.closing = true;
                state.close_error = None;
                let closer = OrderCloser::from_env(env);
                let request = state.request;
                smallvec![async_effect! {
                    match closer.close(&order_id, &solution).await {
                        Ok(()) => Some(OrderDetailAction::CloseSucceeded { request }),
                        Err(error) => Some(OrderDetailAction::CloseFailed { request, error }),
                    }
                }]
            },

            OrderDetailAction::CloseSucceeded { request } => {
                if request != state.request {
                    return smallvec![Effect::None];
                }
                state.closing = false;
                state.detail = None;
                state.notice = Some(CLOSED_NOTICE);
                let Some(order_id) = state.order_id.clone() else {
                    return smallvec![Effect::None];
                };
                smallvec![
                    Self::start_load(state, env, order_id),
                    delay! {
                        duration: NOTICE_DURATION,
                        action: OrderDetailAction::NoticeExpired
                    }
                    .cancellable(DETAIL_NOTICE),
                ]
            },

            OrderDetailAction::CloseFailed { request, error } => {
                if request != state.request {
                    return smallvec![Effect::None];
                }
                state.closing = false;
                state.close_error = Some(error);
                smallvec![Effect::None]
            },

            OrderDetailAction::NoticeExpired => {
                state.notice = None;
                smallvec![Effect::None]
            },
        }
    }
}
