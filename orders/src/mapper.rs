//! Maps stored documents into orders and view models.
//!
//! Field names are the only contract with the store:
//! `patrimony`, `description`, `status`, `solution`, `created_at`, `closed_at`.
//! Absent `solution` and `closed_at` are expected on open orders and map to
//! `None`. Anything else that is missing or mistyped is a [`MappingError`].

use chrono::{DateTime, FixedOffset, Utc};
use helpdesk_core::document::{Document, QuerySnapshot, Timestamp};

use crate::error::MappingError;
use crate::types::{Order, OrderDetail, OrderId, OrderListItem, OrderStatus};

/// Stored field names
pub mod fields {
    /// Asset identifier
    pub const PATRIMONY: &str = "patrimony";
    /// Problem description
    pub const DESCRIPTION: &str = "description";
    /// `open` or `closed`
    pub const STATUS: &str = "status";
    /// Solution text, closed orders only
    pub const SOLUTION: &str = "solution";
    /// Creation time
    pub const CREATED_AT: &str = "created_at";
    /// Closing time, closed orders only
    pub const CLOSED_AT: &str = "closed_at";
}

/// Read a document into an [`Order`].
///
/// # Errors
///
/// Returns [`MappingError`] naming the offending field when a required field
/// is absent, a field has the wrong type, the status is unknown, or a
/// timestamp is out of range.
pub fn to_order(doc: &Document) -> Result<Order, MappingError> {
    let id = OrderId::from(doc.id().clone());

    let required_str = |field: &'static str| -> Result<String, MappingError> {
        doc.get_str(field)
            .map_err(|source| MappingError::WrongType {
                id: id.clone(),
                source,
            })?
            .map(str::to_string)
            .ok_or_else(|| MappingError::MissingField {
                id: id.clone(),
                field,
            })
    };

    let optional_time = |field: &'static str| -> Result<Option<DateTime<Utc>>, MappingError> {
        doc.get_timestamp(field)
            .map_err(|source| MappingError::WrongType {
                id: id.clone(),
                source,
            })?
            .map(|ts: Timestamp| {
                ts.to_datetime()
                    .ok_or_else(|| MappingError::TimestampOutOfRange {
                        id: id.clone(),
                        field,
                    })
            })
            .transpose()
    };

    let patrimony = required_str(fields::PATRIMONY)?;
    let description = required_str(fields::DESCRIPTION)?;
    let raw_status = required_str(fields::STATUS)?;
    let status = raw_status
        .parse::<OrderStatus>()
        .map_err(|_| MappingError::UnknownStatus {
            id: id.clone(),
            value: raw_status,
        })?;
    let created_at =
        optional_time(fields::CREATED_AT)?.ok_or_else(|| MappingError::MissingField {
            id: id.clone(),
            field: fields::CREATED_AT,
        })?;
    let closed_at = optional_time(fields::CLOSED_AT)?;
    let solution = doc
        .get_str(fields::SOLUTION)
        .map_err(|source| MappingError::WrongType {
            id: id.clone(),
            source,
        })?
        .map(str::to_string);

    Ok(Order {
        id,
        patrimony,
        description,
        status,
        solution,
        created_at,
        closed_at,
    })
}

/// Map a document into a list row.
///
/// # Errors
///
/// See [`to_order`].
pub fn to_list_item(doc: &Document, offset: &FixedOffset) -> Result<OrderListItem, MappingError> {
    to_order(doc).map(|order| order.to_list_item(offset))
}

/// Map a document into the detail view model.
///
/// # Errors
///
/// See [`to_order`].
pub fn to_detail(doc: &Document, offset: &FixedOffset) -> Result<OrderDetail, MappingError> {
    to_order(doc).map(|order| order.to_detail(offset))
}

/// Map a whole snapshot, keeping store order.
///
/// Fails as a unit: one malformed document fails the snapshot.
///
/// # Errors
///
/// Returns the first [`MappingError`] encountered.
pub fn map_snapshot(
    snapshot: &QuerySnapshot,
    offset: &FixedOffset,
) -> Result<Vec<OrderListItem>, MappingError> {
    snapshot
        .documents()
        .iter()
        .map(|doc| to_list_item(doc, offset))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::format::default_display_offset;
    use helpdesk_core::document::{DocumentId, FieldError, FieldValue};
    use std::collections::BTreeMap;

    const T0: Timestamp = Timestamp::new(1_658_163_600, 0);
    const T1: Timestamp = Timestamp::new(1_658_167_200, 0);

    fn doc(id: &str, pairs: Vec<(&str, FieldValue)>) -> Document {
        let fields: BTreeMap<String, FieldValue> = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Document::new(DocumentId::new(id), fields)
    }

    fn open_doc() -> Document {
        doc(
            "1",
            vec![
                ("patrimony", "123456".into()),
                ("description", "Monitor não liga".into()),
                ("status", "open".into()),
                ("created_at", T0.into()),
            ],
        )
    }

    #[test]
    fn open_order_maps_to_list_item() {
        let item = to_list_item(&open_doc(), &default_display_offset()).unwrap();
        assert_eq!(
            item,
            OrderListItem {
                id: OrderId::new("1"),
                patrimony: "123456".to_string(),
                when: "18/07/2022 às 14:00".to_string(),
                status: OrderStatus::Open,
            }
        );
    }

    #[test]
    fn open_order_detail_has_no_solution_or_closed() {
        let detail = to_detail(&open_doc(), &default_display_offset()).unwrap();
        assert_eq!(detail.solution, None);
        assert_eq!(detail.closed, None);
        assert!(detail.can_close());
    }

    #[test]
    fn explicit_nulls_read_as_absent() {
        let mut d = open_doc().fields().clone();
        d.insert("solution".to_string(), FieldValue::Null);
        d.insert("closed_at".to_string(), FieldValue::Null);
        let detail = to_detail(
            &Document::new(DocumentId::new("1"), d),
            &default_display_offset(),
        )
        .unwrap();
        assert_eq!((detail.solution, detail.closed), (None, None));
    }

    #[test]
    fn closed_order_detail() {
        let closed = doc(
            "1",
            vec![
                ("patrimony", "123456".into()),
                ("description", "Monitor não liga".into()),
                ("status", "closed".into()),
                ("solution", "Replaced battery".into()),
                ("created_at", T0.into()),
                ("closed_at", T1.into()),
            ],
        );
        let detail = to_detail(&closed, &default_display_offset()).unwrap();
        assert_eq!(detail.solution.as_deref(), Some("Replaced battery"));
        assert_eq!(detail.closed.as_deref(), Some("18/07/2022 às 15:00"));
        assert_eq!(detail.when, "18/07/2022 às 14:00");
        assert!(!detail.can_close());
    }

    #[test]
    fn missing_created_at_names_field() {
        let mut fields = open_doc().fields().clone();
        fields.remove("created_at");
        let err = to_order(&Document::new(DocumentId::new("1"), fields)).unwrap_err();
        assert_eq!(
            err,
            MappingError::MissingField {
                id: OrderId::new("1"),
                field: "created_at"
            }
        );
        assert_eq!(err.field(), "created_at");
    }

    #[test]
    fn wrong_type_names_field() {
        let mut fields = open_doc().fields().clone();
        fields.insert("created_at".to_string(), "ontem".into());
        let err = to_order(&Document::new(DocumentId::new("1"), fields)).unwrap_err();
        assert!(matches!(
            err,
            MappingError::WrongType {
                source: FieldError::WrongType { ref field, .. },
                ..
            } if field == "created_at"
        ));
        assert_eq!(err.field(), "created_at");
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut fields = open_doc().fields().clone();
        fields.insert("status".to_string(), "pending".into());
        let err = to_order(&Document::new(DocumentId::new("1"), fields)).unwrap_err();
        assert_eq!(err.field(), "status");
    }

    #[test]
    fn snapshot_fails_as_a_unit() {
        let bad = doc("2", vec![("status", "open".into())]);
        let snapshot = QuerySnapshot::new(vec![open_doc(), bad]);
        assert!(map_snapshot(&snapshot, &default_display_offset()).is_err());
    }

    #[test]
    fn snapshot_keeps_store_order() {
        let mut second = open_doc().fields().clone();
        second.insert("patrimony".to_string(), "999".into());
        let snapshot = QuerySnapshot::new(vec![
            Document::new(DocumentId::new("b"), second),
            Document::new(DocumentId::new("a"), open_doc().fields().clone()),
        ]);
        let ids: Vec<String> = map_snapshot(&snapshot, &default_display_offset())
            .unwrap()
            .into_iter()
            .map(|item| item.id.to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
