//! Domain types for service orders.
//!
//! An order moves through exactly one transition, `open → closed`. The store
//! owns the canonical [`Order`]; everything else here is a disposable view
//! model rebuilt from a fresh read.

use chrono::{DateTime, FixedOffset, Utc};
use helpdesk_core::document::DocumentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::format::format_datetime;

/// Unique identifier for an order, assigned by the store on creation
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    /// Creates a new `OrderId` from a string
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The store document this order lives in
    #[must_use]
    pub fn document_id(&self) -> DocumentId {
        DocumentId::new(self.0.clone())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<DocumentId> for OrderId {
    fn from(id: DocumentId) -> Self {
        Self(id.into_inner())
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle status of an order
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Waiting for a solution
    #[default]
    Open,
    /// Solved; carries `solution` and `closed_at`
    Closed,
}

/// Which orders the list tracks
pub type StatusFilter = OrderStatus;

impl OrderStatus {
    /// Name stored in the `status` field
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    /// Label shown to users
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "em andamento",
            Self::Closed => "finalizado",
        }
    }

    /// Returns true if the order is still open
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown `status` value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown order status '{0}'")]
pub struct ParseOrderStatusError(pub String);

impl FromStr for OrderStatus {
    type Err = ParseOrderStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(ParseOrderStatusError(other.to_string())),
        }
    }
}

/// An order as read from the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    /// Store-assigned id
    pub id: OrderId,
    /// Asset identifier of the equipment
    pub patrimony: String,
    /// Problem description
    pub description: String,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Set when the order is closed
    pub solution: Option<String>,
    /// Server time of creation
    pub created_at: DateTime<Utc>,
    /// Server time of closing
    pub closed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Project into the list view model
    #[must_use]
    pub fn to_list_item(&self, offset: &FixedOffset) -> OrderListItem {
        OrderListItem {
            id: self.id.clone(),
            patrimony: self.patrimony.clone(),
            when: format_datetime(&self.created_at, offset),
            status: self.status,
        }
    }

    /// Project into the detail view model
    #[must_use]
    pub fn to_detail(&self, offset: &FixedOffset) -> OrderDetail {
        OrderDetail {
            id: self.id.clone(),
            patrimony: self.patrimony.clone(),
            when: format_datetime(&self.created_at, offset),
            status: self.status,
            description: self.description.clone(),
            solution: self.solution.clone(),
            closed: self.closed_at.as_ref().map(|at| format_datetime(at, offset)),
        }
    }
}

/// One row of the order list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderListItem {
    /// Order id
    pub id: OrderId,
    /// Asset identifier
    pub patrimony: String,
    /// Formatted creation time
    pub when: String,
    /// Lifecycle status
    pub status: OrderStatus,
}

/// Everything the detail screen shows about one order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    /// Order id
    pub id: OrderId,
    /// Asset identifier
    pub patrimony: String,
    /// Formatted creation time
    pub when: String,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Problem description
    pub description: String,
    /// `None` while open
    pub solution: Option<String>,
    /// Formatted closing time, `None` while open
    pub closed: Option<String>,
}

impl OrderDetail {
    /// Whether the close action should be offered
    #[must_use]
    pub const fn can_close(&self) -> bool {
        self.status.is_open()
    }
}
