//! # Helpdesk Runtime
//!
//! Runtime implementation for the helpdesk reducers.
//!
//! This crate provides the [`Store`] that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: Owns the state, serialises actions through the reducer and
//!   publishes every new state on a `watch` channel
//! - **Effect Executor**: Runs effect descriptions on tokio tasks and feeds the
//!   actions they produce back into the reducer
//! - **Cancellation Registry**: At most one live task per [`EffectId`]
//!
//! ## Example
//!
//! ```ignore
//! use helpdesk_runtime::Store;
//!
//! let store = Store::new(OrderListState::default(), OrderListReducer::new(), env);
//!
//! store.send(OrderListAction::Subscribe { filter: OrderStatus::Open })?;
//!
//! let mut rx = store.watch();
//! rx.wait_for(|s| !s.loading).await?;
//! ```

use futures::{future::BoxFuture, FutureExt, StreamExt};
use helpdesk_core::{
    effect::{Effect, EffectId},
    reducer::Reducer,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;

pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

use error::StoreError;

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl AtomicCounterGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Registered cancellable task
struct Registration {
    token: u64,
    handle: AbortHandle,
}

/// Cancellation registry: one live task per effect id
#[derive(Default)]
struct Cancellations {
    next_token: AtomicU64,
    tasks: Mutex<HashMap<EffectId, Registration>>,
}

impl Cancellations {
    /// Abort the task registered under `id`. Returns whether one was running.
    fn cancel(&self, id: &EffectId) -> bool {
        let removed = match self.tasks.lock() {
            Ok(mut tasks) => tasks.remove(id),
            Err(poisoned) => poisoned.into_inner().remove(id),
        };
        removed.is_some_and(|registration| {
            registration.handle.abort();
            true
        })
    }

    /// Abort everything
    fn cancel_all(&self) -> usize {
        let drained: Vec<Registration> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain().map(|(_, r)| r).collect(),
            Err(poisoned) => poisoned.into_inner().drain().map(|(_, r)| r).collect(),
        };
        for registration in &drained {
            registration.handle.abort();
        }
        drained.len()
    }

    /// Drop the entry for `id` if it still belongs to `token`
    fn release(&self, id: &EffectId, token: u64) {
        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        if tasks.get(id).is_some_and(|r| r.token == token) {
            tasks.remove(id);
        }
    }

    fn len(&self) -> usize {
        match self.tasks.lock() {
            Ok(tasks) => tasks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Store module - The runtime for reducers
pub mod store {
    use super::{
        broadcast, watch, Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, BoxFuture,
        Cancellations, Duration, Effect, EffectId, FutureExt, Ordering, Reducer, Registration,
        StoreError, StreamExt, Weak,
    };
    use helpdesk_core::SmallVec;

    /// Shared store internals. Effects hold a `Weak` to this so that dropping
    /// the last `Store` handle stops all background work.
    struct Inner<S, A, E, R> {
        state: watch::Sender<S>,
        reducer: R,
        environment: E,
        shutdown: AtomicBool,
        pending_effects: Arc<AtomicUsize>,
        cancellations: Cancellations,
        /// Every action produced by an effect is broadcast to observers.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Drop for Inner<S, A, E, R> {
        fn drop(&mut self) {
            let cancelled = self.cancellations.cancel_all();
            if cancelled > 0 {
                tracing::debug!(cancelled, "Store dropped, cancelled running effects");
            }
        }
    }

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (published on a `watch` channel after every reducer pass)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// Cloning a `Store` yields another handle to the same runtime. When the
    /// last handle is dropped every cancellable effect is aborted and running
    /// streams stop at their next item.
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        inner: Arc<Inner<S, A, E, R>>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast buffers 16 actions; use
        /// [`Store::with_broadcast_capacity`] for chattier feedback loops.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Create a new Store with custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (state, _) = watch::channel(initial_state);
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                inner: Arc::new(Inner {
                    state,
                    reducer,
                    environment,
                    shutdown: AtomicBool::new(false),
                    pending_effects: Arc::new(AtomicUsize::new(0)),
                    cancellations: Cancellations::default(),
                    action_broadcast,
                }),
            }
        }

        /// Send an action to the store
        ///
        /// 1. Runs the reducer with (state, action, environment) under the
        ///    state lock and publishes the resulting state atomically
        /// 2. Starts the returned effects on the runtime
        ///
        /// Returns once the reducer has run; effects keep running in the background.
        /// Must be called from within a tokio runtime.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub fn send(&self, action: A) -> Result<(), StoreError> {
            send_internal(&self.inner, action)
        }

        /// Send an action and wait for a matching result action
        ///
        /// Subscribes to the action broadcast BEFORE sending so the reply cannot
        /// be missed, then returns the first effect-produced action matching
        /// `predicate`.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.inner.action_broadcast.subscribe();

            self.send(action)?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.inner.action_broadcast.subscribe()
        }

        /// Watch the state
        ///
        /// The receiver sees every published state in full; it never observes a
        /// half-applied transition.
        #[must_use]
        pub fn watch(&self) -> watch::Receiver<S> {
            self.inner.state.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let count = store.state(|s| s.items.len());
        /// ```
        pub fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            f(&self.inner.state.borrow())
        }

        /// Number of cancellable effects currently registered
        #[must_use]
        pub fn registered_effects(&self) -> usize {
            self.inner.cancellations.len()
        }

        /// Initiate graceful shutdown of the store
        ///
        /// 1. Sets the shutdown flag (rejecting new actions)
        /// 2. Cancels every registered effect (live subscriptions never finish on their own)
        /// 3. Waits for remaining effects to complete (with timeout)
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.inner.shutdown.store(true, Ordering::Release);
            let cancelled = self.inner.cancellations.cancel_all();
            tracing::debug!(cancelled, "Cancelled registered effects");

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.inner.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }
    }

    fn send_internal<S, A, E, R>(inner: &Arc<Inner<S, A, E, R>>, action: A) -> Result<(), StoreError>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        if inner.shutdown.load(Ordering::Acquire) {
            tracing::warn!("Rejected action: store is shutting down");
            metrics::counter!("store.shutdown.rejected_actions").increment(1);
            return Err(StoreError::ShutdownInProgress);
        }

        metrics::counter!("store.actions.total").increment(1);

        let mut effects = SmallVec::new();
        let start = std::time::Instant::now();
        inner.state.send_modify(|state| {
            effects = inner.reducer.reduce(state, action, &inner.environment);
        });
        metrics::histogram!("store.reducer.duration_seconds")
            .record(start.elapsed().as_secs_f64());

        tracing::trace!("Reducer completed, returned {} effects", effects.len());

        for effect in effects {
            execute_effect(inner, effect);
        }
        Ok(())
    }

    /// Start an effect without waiting for it
    fn execute_effect<S, A, E, R>(inner: &Arc<Inner<S, A, E, R>>, effect: Effect<A>)
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        match effect {
            Effect::None => {
                metrics::counter!("store.effects.executed", "type" => "none").increment(1);
            },
            Effect::Cancel(id) => {
                metrics::counter!("store.effects.executed", "type" => "cancel").increment(1);
                if inner.cancellations.cancel(&id) {
                    tracing::debug!(effect_id = %id, "Cancelled effect");
                    metrics::counter!("store.effects.cancelled").increment(1);
                } else {
                    tracing::trace!(effect_id = %id, "Nothing to cancel");
                }
            },
            Effect::Cancellable { id, effect } => {
                metrics::counter!("store.effects.executed", "type" => "cancellable").increment(1);
                register(inner, id, *effect);
            },
            Effect::Parallel(effects) => {
                for effect in effects {
                    execute_effect(inner, effect);
                }
            },
            other => {
                let weak = Arc::downgrade(inner);
                let guard = AtomicCounterGuard::new(&inner.pending_effects);
                tokio::spawn(async move {
                    let _guard = guard;
                    run_effect(weak, other).await;
                });
            },
        }
    }

    /// Spawn `effect` under `id`, aborting whatever ran there before.
    ///
    /// The old task is aborted and the new one inserted while holding the
    /// registry lock, so two live tasks never share an id.
    fn register<S, A, E, R>(inner: &Arc<Inner<S, A, E, R>>, id: EffectId, effect: Effect<A>)
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        let token = inner.cancellations.next_token.fetch_add(1, Ordering::Relaxed);
        let mut tasks = match inner.cancellations.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(previous) = tasks.remove(&id) {
            previous.handle.abort();
            tracing::debug!(effect_id = %id, "Replaced in-flight effect");
            metrics::counter!("store.effects.cancelled").increment(1);
        }

        let weak = Arc::downgrade(inner);
        let guard = AtomicCounterGuard::new(&inner.pending_effects);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            run_effect(weak.clone(), effect).await;
            if let Some(inner) = weak.upgrade() {
                inner.cancellations.release(&task_id, token);
            }
        });

        tasks.insert(
            id,
            Registration {
                token,
                handle: handle.abort_handle(),
            },
        );
    }

    /// Feed an effect-produced action back into the store
    fn feed_back<S, A, E, R>(weak: &Weak<Inner<S, A, E, R>>, action: A) -> bool
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        let Some(inner) = weak.upgrade() else {
            tracing::trace!("Store dropped, discarding feedback action");
            return false;
        };
        let _ = inner.action_broadcast.send(action.clone());
        send_internal(&inner, action).is_ok()
    }

    /// Run an effect to completion on the current task
    fn run_effect<S, A, E, R>(weak: Weak<Inner<S, A, E, R>>, effect: Effect<A>) -> BoxFuture<'static, ()>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        async move {
            match effect {
                Effect::None => {},
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    if let Some(action) = fut.await {
                        feed_back(&weak, action);
                    }
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    tokio::time::sleep(duration).await;
                    feed_back(&weak, *action);
                },
                Effect::Stream(mut stream) => {
                    metrics::counter!("store.effects.executed", "type" => "stream").increment(1);
                    while let Some(action) = stream.next().await {
                        if !feed_back(&weak, action) {
                            break;
                        }
                    }
                    tracing::trace!("Effect::Stream finished");
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential").increment(1);
                    for effect in effects {
                        run_effect(weak.clone(), effect).await;
                    }
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    futures::future::join_all(
                        effects.into_iter().map(|effect| run_effect(weak.clone(), effect)),
                    )
                    .await;
                },
                nested @ (Effect::Cancellable { .. } | Effect::Cancel(_)) => {
                    if let Some(inner) = weak.upgrade() {
                        execute_effect(&inner, nested);
                    }
                },
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_core::{smallvec, SmallVec};

    #[derive(Clone, Debug, Default)]
    struct TickState {
        ticks: Vec<u32>,
    }

    #[derive(Clone, Debug)]
    enum TickAction {
        Start,
        Stop,
        Tick(u32),
    }

    #[derive(Clone)]
    struct TickReducer;

    impl Reducer for TickReducer {
        type State = TickState;
        type Action = TickAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut TickState,
            action: TickAction,
            _env: &(),
        ) -> SmallVec<[Effect<TickAction>; 4]> {
            match action {
                TickAction::Start => {
                    let ticks = futures::stream::unfold(0_u32, |n| async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Some((TickAction::Tick(n), n + 1))
                    });
                    smallvec![Effect::Stream(Box::pin(ticks)).cancellable("ticks")]
                },
                TickAction::Stop => smallvec![Effect::Cancel(EffectId::new("ticks"))],
                TickAction::Tick(n) => {
                    state.ticks.push(n);
                    smallvec![Effect::None]
                },
            }
        }
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code can use unwrap
    async fn cancel_stops_registered_stream() {
        let store = Store::new(TickState::default(), TickReducer, ());
        store.send(TickAction::Start).unwrap();
        assert_eq!(store.registered_effects(), 1);

        let mut rx = store.watch();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.ticks.len() >= 2))
            .await
            .unwrap()
            .unwrap();

        store.send(TickAction::Stop).unwrap();
        assert_eq!(store.registered_effects(), 0);

        let seen = store.state(|s| s.ticks.len());
        tokio::time::sleep(Duration::from_millis(40)).await;
        // At most one tick that was already being reduced may still land.
        assert!(store.state(|s| s.ticks.len()) <= seen + 1);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code can use unwrap
    async fn restarting_replaces_in_flight_stream() {
        let store = Store::new(TickState::default(), TickReducer, ());
        store.send(TickAction::Start).unwrap();
        store.send(TickAction::Start).unwrap();
        assert_eq!(store.registered_effects(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let ticks = store.state(|s| s.ticks.clone());
        // A single live stream emits strictly increasing values.
        assert!(ticks.windows(2).all(|w| w[0] < w[1]), "{ticks:?}");
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code can use unwrap
    async fn shutdown_cancels_and_rejects() {
        let store = Store::new(TickState::default(), TickReducer, ());
        store.send(TickAction::Start).unwrap();

        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(
            store.send(TickAction::Start),
            Err(StoreError::ShutdownInProgress)
        ));
    }

    #[test]
    fn cancel_unknown_id_is_noop() {
        let registry = Cancellations::default();
        assert!(!registry.cancel(&EffectId::new("missing")));
        assert_eq!(registry.cancel_all(), 0);
    }
}
