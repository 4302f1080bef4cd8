//! In-memory implementation of [`DocumentStore`] for tests.
//!
//! Behaves like the remote store where the helpdesk can observe it:
//!
//! - live queries push an initial snapshot and a new full snapshot only when
//!   the filtered result set actually changes
//! - updates are applied atomically with their precondition and resolve
//!   [`ServerTimestamp`](helpdesk_core::document::ServerTimestamp) against the
//!   injected clock
//! - documents are returned in id order
//!
//! On top of that it counts calls per operation, tracks how many listeners are
//! open and how many have been released, and can be told to fail.

use async_stream::stream;
use helpdesk_core::document::{
    Document, DocumentId, DocumentStore, FieldUpdate, FieldValue, Filter, Precondition,
    QuerySnapshot, SnapshotStream, StoreError, Timestamp,
};
use helpdesk_core::environment::Clock;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::broadcast;

type Fields = BTreeMap<String, FieldValue>;
type Collection = BTreeMap<DocumentId, Fields>;

/// Store operation, used to target fault injection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`DocumentStore::query`]
    Query,
    /// [`DocumentStore::get_document`]
    Get,
    /// [`DocumentStore::update_document`]
    Update,
    /// [`DocumentStore::add_document`]
    Add,
}

/// Number of calls made per operation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Live queries opened
    pub queries: usize,
    /// Single document reads
    pub gets: usize,
    /// Update attempts, including rejected ones
    pub updates: usize,
    /// Document creations
    pub adds: usize,
}

impl CallCounts {
    /// Total calls across all operations.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.queries + self.gets + self.updates + self.adds
    }
}

#[derive(Clone, Debug)]
enum Change {
    Written { collection: String },
    Failed { collection: String, error: StoreError },
}

struct Inner {
    collections: RwLock<HashMap<String, Collection>>,
    changes: broadcast::Sender<Change>,
    clock: Box<dyn Clock>,
    next_id: AtomicU64,
    calls: Mutex<CallCounts>,
    faults: Mutex<HashMap<Operation, StoreError>>,
    open_listeners: Arc<AtomicUsize>,
    released_listeners: Arc<AtomicUsize>,
}

/// Counts a listener as open until dropped.
struct ListenerGuard {
    open: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ListenerGuard {
    fn new(open: &Arc<AtomicUsize>, released: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self {
            open: Arc::clone(open),
            released: Arc::clone(released),
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// In-memory document store.
///
/// Cloning is cheap and every clone sees the same data.
///
/// # Example
///
/// ```
/// use helpdesk_core::document::{DocumentId, DocumentStore, FieldUpdate, Precondition};
/// use helpdesk_testing::{test_clock, InMemoryDocumentStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryDocumentStore::new(test_clock());
/// store.insert_document("orders", "1", FieldUpdate::new().set("status", "open"));
///
/// let guard = Some(Precondition::field_equals("status", "open"));
/// let close = FieldUpdate::new().set("status", "closed");
/// assert!(store.update_document("orders", &DocumentId::new("1"), close.clone(), guard.clone()).await.is_ok());
/// assert!(store.update_document("orders", &DocumentId::new("1"), close, guard).await.is_err());
/// # });
/// ```
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    inner: Arc<Inner>,
}

impl InMemoryDocumentStore {
    /// Create an empty store whose server timestamps come from `clock`.
    #[must_use]
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self::with_capacity(clock, 64)
    }

    /// Create an empty store buffering up to `capacity` pending change
    /// notifications per listener.
    ///
    /// A listener that falls further behind resynchronises with a fresh
    /// snapshot.
    #[must_use]
    pub fn with_capacity(clock: impl Clock + 'static, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                collections: RwLock::new(HashMap::new()),
                changes,
                clock: Box::new(clock),
                next_id: AtomicU64::new(1),
                calls: Mutex::new(CallCounts::default()),
                faults: Mutex::new(HashMap::new()),
                open_listeners: Arc::new(AtomicUsize::new(0)),
                released_listeners: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// Seed or overwrite a document without counting a call.
    ///
    /// Server timestamps resolve against the store clock. Open listeners on
    /// the collection are notified.
    pub fn insert_document(&self, collection: &str, id: impl Into<DocumentId>, fields: FieldUpdate) {
        let resolved = fields.resolve(self.server_now());
        self.write_collections()
            .entry(collection.to_string())
            .or_default()
            .insert(id.into(), resolved);
        self.notify_written(collection);
    }

    /// Seed a document with raw fields, including values a real client would never write.
    pub fn insert_raw(&self, collection: &str, id: impl Into<DocumentId>, fields: Fields) {
        self.write_collections()
            .entry(collection.to_string())
            .or_default()
            .insert(id.into(), fields);
        self.notify_written(collection);
    }

    /// Remove a document without counting a call.
    pub fn remove_document(&self, collection: &str, id: &DocumentId) {
        let removed = self
            .write_collections()
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            self.notify_written(collection);
        }
    }

    /// Read a document without counting a call.
    #[must_use]
    pub fn document(&self, collection: &str, id: &DocumentId) -> Option<Document> {
        self.read_collections()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id.clone(), fields.clone()))
    }

    /// Number of documents in `collection`.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.read_collections().get(collection).map_or(0, BTreeMap::len)
    }

    /// Make every subsequent call of `operation` fail with `error`.
    ///
    /// For [`Operation::Query`] the stream yields the error as its first item
    /// and ends.
    pub fn fail(&self, operation: Operation, error: StoreError) {
        lock(&self.inner.faults).insert(operation, error);
    }

    /// Stop failing `operation`.
    pub fn recover(&self, operation: Operation) {
        lock(&self.inner.faults).remove(&operation);
    }

    /// Deliver `error` to every open listener on `collection`.
    ///
    /// Listeners stay open, like a transient listen error that is later
    /// followed by fresh snapshots.
    pub fn push_listener_error(&self, collection: &str, error: StoreError) {
        let _ = self.inner.changes.send(Change::Failed {
            collection: collection.to_string(),
            error,
        });
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        *lock(&self.inner.calls)
    }

    /// Listeners currently open.
    #[must_use]
    pub fn open_listeners(&self) -> usize {
        self.inner.open_listeners.load(Ordering::SeqCst)
    }

    /// Listeners released since creation.
    #[must_use]
    pub fn released_listeners(&self) -> usize {
        self.inner.released_listeners.load(Ordering::SeqCst)
    }

    fn server_now(&self) -> Timestamp {
        Timestamp::from(self.inner.clock.now())
    }

    fn record(&self, operation: Operation) -> Result<(), StoreError> {
        {
            let mut calls = lock(&self.inner.calls);
            match operation {
                Operation::Query => calls.queries += 1,
                Operation::Get => calls.gets += 1,
                Operation::Update => calls.updates += 1,
                Operation::Add => calls.adds += 1,
            }
        }
        lock(&self.inner.faults)
            .get(&operation)
            .cloned()
            .map_or(Ok(()), Err)
    }

    fn read_collections(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Collection>> {
        self.inner
            .collections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_collections(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Collection>> {
        self.inner
            .collections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn notify_written(&self, collection: &str) {
        // No receivers just means no open listeners.
        let _ = self.inner.changes.send(Change::Written {
            collection: collection.to_string(),
        });
    }

    fn snapshot(&self, collection: &str, filter: &Filter) -> QuerySnapshot {
        let documents = self
            .read_collections()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| filter.matches(fields))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        QuerySnapshot::new(documents)
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("calls", &self.calls())
            .field("open_listeners", &self.open_listeners())
            .finish_non_exhaustive()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn query(&self, collection: &str, filter: Filter) -> SnapshotStream {
        let fault = self.record(Operation::Query).err();
        // Subscribe before the first read so no write can slip in between.
        let mut changes = self.inner.changes.subscribe();
        let guard = ListenerGuard::new(&self.inner.open_listeners, &self.inner.released_listeners);
        let store = self.clone();
        let collection = collection.to_string();

        Box::pin(stream! {
            let _guard = guard;

            if let Some(error) = fault {
                yield Err(error);
                return;
            }

            let mut last = store.snapshot(&collection, &filter);
            yield Ok(last.clone());

            loop {
                match changes.recv().await {
                    Ok(Change::Written { collection: changed }) if changed == collection => {
                        let next = store.snapshot(&collection, &filter);
                        if next != last {
                            last = next.clone();
                            yield Ok(next);
                        }
                    },
                    Ok(Change::Failed { collection: changed, error }) if changed == collection => {
                        yield Err(error);
                    },
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        last = store.snapshot(&collection, &filter);
                        yield Ok(last.clone());
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn get_document(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Document>, StoreError>> + Send + '_>> {
        let result = self
            .record(Operation::Get)
            .map(|()| self.document(collection, id));
        Box::pin(async move { result })
    }

    fn update_document(
        &self,
        collection: &str,
        id: &DocumentId,
        update: FieldUpdate,
        precondition: Option<Precondition>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let result = self.record(Operation::Update).and_then(|()| {
            let now = self.server_now();
            {
                let mut collections = self.write_collections();
                let fields = collections
                    .get_mut(collection)
                    .and_then(|docs| docs.get_mut(id))
                    .ok_or_else(|| StoreError::NotFound {
                        collection: collection.to_string(),
                        id: id.clone(),
                    })?;

                if let Some(guard) = &precondition {
                    if !guard.holds(fields) {
                        return Err(StoreError::PreconditionFailed { id: id.clone() });
                    }
                }

                fields.extend(update.resolve(now));
            }
            self.notify_written(collection);
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn add_document(
        &self,
        collection: &str,
        fields: FieldUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<DocumentId, StoreError>> + Send + '_>> {
        let result = self.record(Operation::Add).map(|()| {
            let id = DocumentId::new(format!(
                "{:020}",
                self.inner.next_id.fetch_add(1, Ordering::SeqCst)
            ));
            let resolved = fields.resolve(self.server_now());
            self.write_collections()
                .entry(collection.to_string())
                .or_default()
                .insert(id.clone(), resolved);
            self.notify_written(collection);
            id
        });
        Box::pin(async move { result })
    }
}
