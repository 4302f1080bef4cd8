//! Human-readable timestamps.
//!
//! Times are rendered as `DD/MM/YYYY às HH:mm` in a fixed display offset.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use helpdesk_core::document::Timestamp;

/// Display pattern, `18/07/2022 às 14:00`
pub const DISPLAY_PATTERN: &str = "%d/%m/%Y às %H:%M";

/// Offset the product ships with (UTC-03:00)
#[must_use]
pub fn default_display_offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| Utc.fix())
}

/// Format a datetime in `offset`.
#[must_use]
pub fn format_datetime(at: &DateTime<Utc>, offset: &FixedOffset) -> String {
    at.with_timezone(offset).format(DISPLAY_PATTERN).to_string()
}

/// Format a store timestamp in `offset`.
///
/// Returns `None` when the timestamp is absent (for example `closed_at` on an
/// open order) or outside the representable range.
///
/// # Examples
///
/// ```
/// use helpdesk_core::document::Timestamp;
/// use helpdesk_orders::format::{default_display_offset, format_timestamp};
///
/// let created = Timestamp::new(1_658_163_600, 0);
/// assert_eq!(
///     format_timestamp(Some(&created), &default_display_offset()).as_deref(),
///     Some("18/07/2022 às 14:00"),
/// );
/// assert_eq!(format_timestamp(None, &default_display_offset()), None);
/// ```
#[must_use]
pub fn format_timestamp(timestamp: Option<&Timestamp>, offset: &FixedOffset) -> Option<String> {
    let at = timestamp?.to_datetime()?;
    Some(format_datetime(&at, offset))
}
