//! redb table layout for persisted telemetry.
//!
//! Keys are `(device_id, timestamp)` where the timestamp is the
//! fixed-width RFC 3339 rendering from
//! [`timestamp_key`](crate::model::history::timestamp_key), so a range
//! scan over one device returns samples in time order.

use redb::TableDefinition;

/// Current measurements keyed by `(device_id, timestamp)`.
pub const CURRENT_HISTORY: TableDefinition<(&str, &str), f64> =
    TableDefinition::new("current_history");

/// Sorts after every rendered timestamp (`~` > any digit).
pub const KEY_UPPER_BOUND: &str = "~";
