//! Live order list.
//!
//! [`OrderListReducer`] keeps one store subscription open for the selected
//! status filter and republishes a freshly mapped list for every snapshot the
//! store pushes.
//!
//! # Filter changes
//!
//! Each `Subscribe` bumps `generation` and registers the new snapshot stream
//! under [`LIST_SUBSCRIPTION`]. The runtime cancels the previous stream before
//! starting the new one, and any snapshot still tagged with an older
//! generation is discarded, so items from one filter never show up under
//! another.

use futures::StreamExt;
use helpdesk_core::document::{Filter, QuerySnapshot, StoreError};
use helpdesk_core::effect::{Effect, EffectId};
use helpdesk_core::reducer::Reducer;
use helpdesk_core::{smallvec, SmallVec};
use std::sync::Arc;

use crate::error::ListError;
use crate::mapper::{fields, map_snapshot};
use crate::types::{OrderListItem, StatusFilter};
use crate::OrdersEnvironment;

/// Registration id of the live list query
pub const LIST_SUBSCRIPTION: &str = "order-list-subscription";

/// State of the live list
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderListState {
    /// Currently selected filter
    pub filter: StatusFilter,
    /// Whether a subscription is active
    pub subscribed: bool,
    /// True from `Subscribe` until the first snapshot or error
    pub loading: bool,
    /// Last successfully mapped snapshot, in store order
    pub items: Arc<[OrderListItem]>,
    /// Set when the last snapshot could not be delivered
    pub error: Option<ListError>,
    /// Bumped on every subscribe and unsubscribe
    pub generation: u64,
}

impl OrderListState {
    /// Number of items in the current list
    #[must_use]
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// What the list screen should show
    #[must_use]
    pub fn presentation(&self) -> ListPresentation<'_> {
        if !self.subscribed {
            ListPresentation::Idle
        } else if self.loading {
            ListPresentation::Loading
        } else if let Some(error) = &self.error {
            ListPresentation::Failed {
                message: error.to_string(),
                stale_items: &self.items,
            }
        } else if self.items.is_empty() {
            ListPresentation::Empty {
                filter: self.filter,
            }
        } else {
            ListPresentation::Ready(&self.items)
        }
    }
}

/// Renderable view of [`OrderListState`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListPresentation<'a> {
    /// Not subscribed
    Idle,
    /// Waiting for the first snapshot of the current filter
    Loading,
    /// No orders match the filter
    Empty {
        /// Selected filter
        filter: StatusFilter,
    },
    /// Orders to show
    Ready(&'a [OrderListItem]),
    /// The list could not be refreshed; `stale_items` may be shown only as stale
    Failed {
        /// Diagnostic message
        message: String,
        /// Items from the last good snapshot
        stale_items: &'a [OrderListItem],
    },
}

impl ListPresentation<'_> {
    /// Copy shown for an empty list
    #[must_use]
    pub fn empty_message(filter: StatusFilter) -> String {
        format!("Você ainda não possui solicitações {}", filter.label())
    }
}

/// Actions for the live list
#[derive(Clone, Debug)]
pub enum OrderListAction {
    /// Open (or replace) the subscription for `filter`
    Subscribe {
        /// Status to track
        filter: StatusFilter,
    },
    /// Snapshot pushed by the store
    SnapshotReceived {
        /// Generation of the subscription that produced it
        generation: u64,
        /// Full result set
        snapshot: QuerySnapshot,
    },
    /// Subscription error pushed by the store
    SubscriptionFailed {
        /// Generation of the subscription that produced it
        generation: u64,
        /// Store error
        error: StoreError,
    },
    /// Release the subscription; repeated calls are harmless
    Unsubscribe,
}

/// Reducer for the live list
#[derive(Clone, Debug, Default)]
pub struct OrderListReducer;

impl OrderListReducer {
    /// Creates a new list reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn subscription(
        env: &OrdersEnvironment,
        filter: StatusFilter,
        generation: u64,
    ) -> Effect<OrderListAction> {
        let store = Arc::clone(&env.store);
        let collection = Arc::clone(&env.collection);
        let query = Filter::field_equals(fields::STATUS, filter.as_str());

        // The listener is opened when the runtime first polls the stream.
        let snapshots = futures::stream::once(async move { store.query(&collection, query) })
            .flatten()
            .map(move |result| match result {
                Ok(snapshot) => OrderListAction::SnapshotReceived {
                    generation,
                    snapshot,
                },
                Err(error) => OrderListAction::SubscriptionFailed { generation, error },
            });

        Effect::Stream(Box::pin(snapshots)).cancellable(LIST_SUBSCRIPTION)
    }
}

impl Reducer for OrderListReducer {
    type State = OrderListState;
    type Action = OrderListAction;
    type Environment = OrdersEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            OrderListAction::Subscribe { filter } => {
                state.generation += 1;
                state.filter = filter;
                state.subscribed = true;
                state.loading = true;
                state.items = Arc::from(Vec::new());
                state.error = None;

                tracing::debug!(%filter, generation = state.generation, "Subscribing to orders");
                smallvec![Self::subscription(env, filter, state.generation)]
            },

            OrderListAction::SnapshotReceived {
                generation,
                snapshot,
            } => {
                if !state.subscribed || generation != state.generation {
                    tracing::warn!(
                        generation,
                        current = state.generation,
                        "Discarding snapshot from a previous subscription"
                    );
                    return smallvec![Effect::None];
                }

                state.loading = false;
                match map_snapshot(&snapshot, &env.display_offset) {
                    Ok(items) => {
                        tracing::debug!(count = items.len(), "Published order list");
                        state.items = Arc::from(items);
                        state.error = None;
                    },
                    Err(error) => {
                        tracing::warn!(%error, "Snapshot contains a malformed order");
                        state.error = Some(ListError::Mapping(error));
                    },
                }
                smallvec![Effect::None]
            },

            OrderListAction::SubscriptionFailed { generation, error } => {
                if !state.subscribed || generation != state.generation {
                    tracing::warn!(
                        generation,
                        current = state.generation,
                        "Discarding error from a previous subscription"
                    );
                    return smallvec![Effect::None];
                }

                tracing::error!(%error, "Order subscription failed");
                state.loading = false;
                state.error = Some(ListError::Subscription(error));
                smallvec![Effect::None]
            },

            OrderListAction::Unsubscribe => {
                if !state.subscribed {
                    return smallvec![Effect::None];
                }

                state.generation += 1;
                state.subscribed = false;
                state.loading = false;
                state.items = Arc::from(Vec::new());
                state.error = None;

                tracing::debug!("Unsubscribed from orders");
                smallvec![Effect::Cancel(EffectId::new(LIST_SUBSCRIPTION))]
            },
        }
    }
}
