//! Document store collaborator for the helpdesk.
//!
//! This module defines the narrow interface through which the helpdesk talks to
//! its remote document database:
//!
//! - Live queries that push a full [`QuerySnapshot`] whenever the result changes
//! - One-shot document reads
//! - Single-document updates applied atomically across all given fields
//! - Document creation with store-assigned ids
//!
//! Field names are the only compatibility contract with the store. Values are
//! kept deliberately small ([`FieldValue`]) and timestamps are store-native
//! ([`Timestamp`]). The "resolve to the server clock" sentinel is its own type,
//! [`ServerTimestamp`], and can only appear on the write side.
//!
//! # Implementations
//!
//! - `InMemoryDocumentStore` (in `helpdesk-testing` crate): Fast, deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use helpdesk_core::document::{DocumentId, DocumentStore, FieldUpdate, Precondition, StoreError};
//!
//! async fn close<S: DocumentStore>(store: &S) -> Result<(), StoreError> {
//!     let update = FieldUpdate::new()
//!         .set("status", "closed")
//!         .set("solution", "Replaced battery")
//!         .set_server_timestamp("closed_at");
//!
//!     store
//!         .update_document(
//!             "orders",
//!             &DocumentId::new("1"),
//!             update,
//!             Some(Precondition::field_equals("status", "open")),
//!         )
//!         .await
//! }
//! ```

use chrono::{DateTime, TimeZone, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `DocumentId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid document ID: {0}")]
pub struct ParseDocumentIdError(String);

/// Opaque identifier assigned by the store when a document is created.
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects blank strings)
/// - `From::from()` and `new()`: No validation (for ids handed back by the store)
///
/// # Examples
///
/// ```
/// use helpdesk_core::document::DocumentId;
///
/// let id = DocumentId::new("1");
/// assert_eq!(id.as_str(), "1");
///
/// assert!("  ".parse::<DocumentId>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new `DocumentId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the document ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `DocumentId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = ParseDocumentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParseDocumentIdError(
                "Document ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Store-native timestamp: whole seconds since the Unix epoch plus nanoseconds.
///
/// # Examples
///
/// ```
/// use helpdesk_core::document::Timestamp;
///
/// let ts = Timestamp::new(1_658_152_800, 0);
/// assert_eq!(ts.to_datetime().unwrap().to_rfc3339(), "2022-07-18T14:00:00+00:00");
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    seconds: i64,
    nanos: u32,
}

impl Timestamp {
    /// Create a timestamp from its raw parts.
    #[must_use]
    pub const fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    /// Whole seconds since the Unix epoch.
    #[must_use]
    pub const fn seconds(self) -> i64 {
        self.seconds
    }

    /// Sub-second nanoseconds.
    #[must_use]
    pub const fn nanos(self) -> u32 {
        self.nanos
    }

    /// Convert to a `chrono` UTC datetime.
    ///
    /// Returns `None` when the value is outside the range `chrono` can represent.
    #[must_use]
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanos).single()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos(),
        }
    }
}

/// A readable field value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Explicit null
    Null,
    /// UTF-8 string
    String(String),
    /// Store-native timestamp
    Timestamp(Timestamp),
}

impl FieldValue {
    /// Short type name used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(ts: Timestamp) -> Self {
        Self::Timestamp(ts)
    }
}

/// Placeholder resolved by the store to its own clock at write time.
///
/// Never computed on the client: the store alone decides the value, so
/// timestamps such as `closed_at` stay server-authoritative.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ServerTimestamp;

/// A single field write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldWrite {
    /// Write a concrete value
    Value(FieldValue),
    /// Write the store's clock at commit time
    ServerTimestamp(ServerTimestamp),
}

/// A set of field writes applied to one document as a single atomic write.
///
/// # Examples
///
/// ```
/// use helpdesk_core::document::FieldUpdate;
///
/// let update = FieldUpdate::new()
///     .set("status", "closed")
///     .set_server_timestamp("closed_at");
/// assert_eq!(update.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldUpdate {
    writes: BTreeMap<String, FieldWrite>,
}

impl FieldUpdate {
    /// Create an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field` to a concrete value.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.writes
            .insert(field.into(), FieldWrite::Value(value.into()));
        self
    }

    /// Set `field` to the store's clock at commit time.
    #[must_use]
    pub fn set_server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.writes
            .insert(field.into(), FieldWrite::ServerTimestamp(ServerTimestamp));
        self
    }

    /// Number of fields written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether the update writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Look up the write for `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldWrite> {
        self.writes.get(field)
    }

    /// Iterate writes in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldWrite)> {
        self.writes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve every [`ServerTimestamp`] against `now` and return the concrete fields.
    ///
    /// Store implementations call this inside their write critical section.
    #[must_use]
    pub fn resolve(self, now: Timestamp) -> BTreeMap<String, FieldValue> {
        self.writes
            .into_iter()
            .map(|(field, write)| {
                let value = match write {
                    FieldWrite::Value(value) => value,
                    FieldWrite::ServerTimestamp(ServerTimestamp) => FieldValue::Timestamp(now),
                };
                (field, value)
            })
            .collect()
    }
}

/// Guard evaluated atomically together with an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Precondition {
    /// The stored `field` must currently equal `value`
    FieldEquals {
        /// Field name
        field: String,
        /// Expected current value
        value: FieldValue,
    },
}

impl Precondition {
    /// Shorthand for [`Precondition::FieldEquals`].
    #[must_use]
    pub fn field_equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check the precondition against a document's current fields.
    #[must_use]
    pub fn holds(&self, fields: &BTreeMap<String, FieldValue>) -> bool {
        match self {
            Self::FieldEquals { field, value } => fields.get(field) == Some(value),
        }
    }
}

/// Query filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Documents whose `field` equals `value`
    FieldEquals {
        /// Field name
        field: String,
        /// Value to match
        value: FieldValue,
    },
}

impl Filter {
    /// Shorthand for [`Filter::FieldEquals`].
    #[must_use]
    pub fn field_equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether a document's fields satisfy this filter.
    #[must_use]
    pub fn matches(&self, fields: &BTreeMap<String, FieldValue>) -> bool {
        match self {
            Self::FieldEquals { field, value } => fields.get(field) == Some(value),
        }
    }
}

/// A stored document as read from the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    fields: BTreeMap<String, FieldValue>,
}

impl Document {
    /// Create a document from its id and fields.
    #[must_use]
    pub const fn new(id: DocumentId, fields: BTreeMap<String, FieldValue>) -> Self {
        Self { id, fields }
    }

    /// The document id.
    #[must_use]
    pub const fn id(&self) -> &DocumentId {
        &self.id
    }

    /// All fields.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Raw field lookup. Absent and explicit null are both `None`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        match self.fields.get(field) {
            None | Some(FieldValue::Null) => None,
            Some(value) => Some(value),
        }
    }

    /// Read a string field.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::WrongType`] if the field holds a non-string value.
    pub fn get_str(&self, field: &str) -> Result<Option<&str>, FieldError> {
        match self.get(field) {
            None => Ok(None),
            Some(FieldValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(FieldError::WrongType {
                field: field.to_string(),
                expected: "string",
                found: other.type_name(),
            }),
        }
    }

    /// Read a timestamp field.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::WrongType`] if the field holds a non-timestamp value.
    pub fn get_timestamp(&self, field: &str) -> Result<Option<Timestamp>, FieldError> {
        match self.get(field) {
            None => Ok(None),
            Some(FieldValue::Timestamp(ts)) => Ok(Some(*ts)),
            Some(other) => Err(FieldError::WrongType {
                field: field.to_string(),
                expected: "timestamp",
                found: other.type_name(),
            }),
        }
    }
}

/// Typed field access failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The field holds a value of another type
    #[error("field '{field}' has type {found}, expected {expected}")]
    WrongType {
        /// Field name
        field: String,
        /// Expected type name
        expected: &'static str,
        /// Actual type name
        found: &'static str,
    },
}

/// Full result set of a live query at one point in time.
///
/// Documents are kept in the order the store returned them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuerySnapshot {
    documents: Vec<Document>,
}

impl QuerySnapshot {
    /// Create a snapshot from documents in store order.
    #[must_use]
    pub const fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// Documents in store order.
    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the result set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Errors reported by the document store.
///
/// Transport, permission and lookup failures are surfaced verbatim; the store
/// client owns any retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Network or backend unavailable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Rejected by store security rules
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No document with this id in the collection
    #[error("document '{id}' not found in '{collection}'")]
    NotFound {
        /// Collection name
        collection: String,
        /// Missing document id
        id: DocumentId,
    },

    /// Update precondition did not hold; nothing was written
    #[error("precondition failed for document '{id}'")]
    PreconditionFailed {
        /// Document id
        id: DocumentId,
    },

    /// Malformed request
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other store-layer failure
    #[error("store error: {0}")]
    Other(String),
}

/// Live stream of query snapshots: one initial snapshot, then one per change.
///
/// Dropping the stream releases the underlying listener.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<QuerySnapshot, StoreError>> + Send>>;

/// Document store abstraction.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be shared with effects running on
/// the runtime's tasks.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn DocumentStore>`). Reducers capture the
/// store inside effects.
pub trait DocumentStore: Send + Sync {
    /// Open a live query over `collection` restricted by `filter`.
    ///
    /// The returned stream yields an initial snapshot and then a fresh full
    /// snapshot every time the result set changes. Errors are delivered in-band.
    fn query(&self, collection: &str, filter: Filter) -> SnapshotStream;

    /// Fetch one document by id. `Ok(None)` means the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or permission failure.
    fn get_document(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Document>, StoreError>> + Send + '_>>;

    /// Apply `update` to one document as a single atomic write.
    ///
    /// When `precondition` is given it is evaluated in the same transaction; if
    /// it does not hold nothing is written.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`]: no such document
    /// - [`StoreError::PreconditionFailed`]: the guard did not hold
    /// - any transport or permission failure
    fn update_document(
        &self,
        collection: &str,
        id: &DocumentId,
        update: FieldUpdate,
        precondition: Option<Precondition>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Create a new document and return its store-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or permission failure.
    fn add_document(
        &self,
        collection: &str,
        fields: FieldUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<DocumentId, StoreError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    mod document_id_tests {
        use super::*;

        #[test]
        #[allow(clippy::expect_used)] // Panics: Test will fail if parse fails
        fn parse_from_str() {
            let id: DocumentId = "abc".parse().expect("parse should succeed");
            assert_eq!(id, DocumentId::new("abc"));
        }

        #[test]
        fn parse_blank_fails() {
            assert!("".parse::<DocumentId>().is_err());
            assert!("   ".parse::<DocumentId>().is_err());
        }

        #[test]
        fn display() {
            assert_eq!(DocumentId::new("42").to_string(), "42");
        }
    }

    mod update_tests {
        use super::*;

        #[test]
        fn resolve_replaces_server_timestamp_only() {
            let now = Timestamp::new(100, 5);
            let resolved = FieldUpdate::new()
                .set("status", "closed")
                .set_server_timestamp("closed_at")
                .resolve(now);

            assert_eq!(resolved.get("status"), Some(&FieldValue::from("closed")));
            assert_eq!(resolved.get("closed_at"), Some(&FieldValue::Timestamp(now)));
        }

        #[test]
        fn later_write_to_same_field_wins() {
            let update = FieldUpdate::new().set("a", "1").set("a", "2");
            assert_eq!(update.len(), 1);
            assert_eq!(
                update.get("a"),
                Some(&FieldWrite::Value(FieldValue::from("2")))
            );
        }

        #[test]
        fn precondition_checks_current_value() {
            let open = fields(&[("status", FieldValue::from("open"))]);
            let closed = fields(&[("status", FieldValue::from("closed"))]);
            let guard = Precondition::field_equals("status", "open");

            assert!(guard.holds(&open));
            assert!(!guard.holds(&closed));
            assert!(!guard.holds(&BTreeMap::new()));
        }
    }

    mod document_tests {
        use super::*;

        #[test]
        fn null_and_absent_read_as_none() {
            let doc = Document::new(
                DocumentId::new("1"),
                fields(&[("solution", FieldValue::Null)]),
            );
            assert_eq!(doc.get_str("solution"), Ok(None));
            assert_eq!(doc.get_timestamp("closed_at"), Ok(None));
        }

        #[test]
        fn wrong_type_is_reported() {
            let doc = Document::new(
                DocumentId::new("1"),
                fields(&[("created_at", FieldValue::from("yesterday"))]),
            );
            assert_eq!(
                doc.get_timestamp("created_at"),
                Err(FieldError::WrongType {
                    field: "created_at".to_string(),
                    expected: "timestamp",
                    found: "string",
                })
            );
        }

        #[test]
        fn filter_matches_on_equality() {
            let filter = Filter::field_equals("status", "open");
            assert!(filter.matches(&fields(&[("status", FieldValue::from("open"))])));
            assert!(!filter.matches(&fields(&[("status", FieldValue::from("closed"))])));
        }
    }

    #[test]
    fn timestamp_round_trips_through_chrono() {
        let ts = Timestamp::new(1_658_152_800, 250);
        let dt = ts.to_datetime();
        assert_eq!(dt.map(Timestamp::from), Some(ts));
    }
}
