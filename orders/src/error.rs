//! Error types for the order components.
//!
//! Every error reaches the caller as a value. Components log before returning
//! but never swallow.

use helpdesk_core::document::{FieldError, StoreError};
use thiserror::Error;

use crate::types::OrderId;

/// A stored document that does not describe a valid order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// A required field is absent or null
    #[error("order '{id}' is missing required field '{field}'")]
    MissingField {
        /// Document id
        id: OrderId,
        /// Field name
        field: &'static str,
    },

    /// A field holds a value of the wrong type
    #[error("order '{id}': {source}")]
    WrongType {
        /// Document id
        id: OrderId,
        /// Underlying field error
        #[source]
        source: FieldError,
    },

    /// `status` is neither `open` nor `closed`
    #[error("order '{id}' has unknown status '{value}'")]
    UnknownStatus {
        /// Document id
        id: OrderId,
        /// Stored value
        value: String,
    },

    /// A timestamp cannot be represented as a calendar date
    #[error("order '{id}' has out-of-range timestamp in '{field}'")]
    TimestampOutOfRange {
        /// Document id
        id: OrderId,
        /// Field name
        field: &'static str,
    },
}

impl MappingError {
    /// Field the error is about
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field, .. } | Self::TimestampOutOfRange { field, .. } => *field,
            Self::WrongType {
                source: FieldError::WrongType { field, .. },
                ..
            } => field.as_str(),
            Self::UnknownStatus { .. } => "status",
        }
    }
}

/// Locally detected precondition failure; never reaches the store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Field is empty after trimming
    #[error("{field} must not be blank")]
    Blank {
        /// Field name
        field: &'static str,
    },
}

/// Failure while loading one order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// No order with this id
    #[error("order '{0}' not found")]
    NotFound(OrderId),

    /// The read itself failed
    #[error("failed to read order: {0}")]
    Read(#[from] StoreError),

    /// The document exists but is malformed
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Failure while closing an order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloseError {
    /// Solution is blank
    #[error("invalid close request: {0}")]
    Validation(#[from] ValidationError),

    /// The order was already closed; nothing was written
    #[error("order '{0}' is already closed")]
    AlreadyClosed(OrderId),

    /// The write failed; the order is unchanged
    #[error("failed to close order: {0}")]
    StoreWrite(StoreError),
}

impl CloseError {
    /// Message shown to users
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Informe a solução para encerrar a solicitação.",
            Self::AlreadyClosed(_) => "Esta solicitação já foi encerrada.",
            Self::StoreWrite(_) => "Não foi possível encerrar a solicitação.",
        }
    }
}

/// Failure while registering a new order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// Patrimony or description is blank
    #[error("invalid order: {0}")]
    Validation(#[from] ValidationError),

    /// The write failed; nothing was created
    #[error("failed to register order: {0}")]
    StoreWrite(#[from] StoreError),
}

/// Reason the live list is in an error state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    /// The store reported a subscription failure
    #[error("order subscription failed: {0}")]
    Subscription(StoreError),

    /// A pushed snapshot contained a malformed order
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Invalid configuration value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Display offset is not `±HH:MM` within a day
    #[error("invalid UTC offset '{0}', expected ±HH:MM")]
    InvalidOffset(String),

    /// Collection name is blank
    #[error("orders collection name must not be blank")]
    BlankCollection,
}
