// ── Telemetry samples and the in-memory history window ──

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::device::DeviceId;

/// Fixed-width RFC 3339 layout used for stored timestamps. Lexical order
/// of the rendered text equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Longest history window a pump keeps, in hours (one leap year).
pub const MAX_HISTORY_HOURS: u32 = 24 * 366;

// ── TelemetrySample ─────────────────────────────────────────────────

/// One persisted measurement. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TelemetrySample {
    pub fn new(device_id: DeviceId, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            device_id,
            timestamp,
            value,
        }
    }

    /// Timestamp rendered as the storage key.
    pub fn timestamp_key(&self) -> String {
        timestamp_key(self.timestamp)
    }
}

pub fn timestamp_key(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

// ── HistoryPoint ────────────────────────────────────────────────────

/// A `(timestamp, value)` pair as returned by history queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

// ── HistoryWindow ───────────────────────────────────────────────────

/// Rolling, time-bounded view of recent samples, oldest first.
///
/// The lower bound is inclusive: a point stamped exactly `now - period`
/// is kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryWindow {
    period_hours: u32,
    points: VecDeque<HistoryPoint>,
}

impl HistoryWindow {
    pub fn new(period_hours: u32) -> Self {
        Self {
            period_hours,
            points: VecDeque::new(),
        }
    }

    /// Window seeded from stored points (already ascending).
    pub fn from_points(period_hours: u32, points: impl IntoIterator<Item = HistoryPoint>) -> Self {
        Self {
            period_hours,
            points: points.into_iter().collect(),
        }
    }

    pub fn period_hours(&self) -> u32 {
        self.period_hours
    }

    pub fn period(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.period_hours))
    }

    /// Oldest timestamp still inside the window at `now`. Saturates at
    /// the earliest representable time.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.period())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Append a point and drop everything older than the cutoff.
    pub fn push(&mut self, point: HistoryPoint, now: DateTime<Utc>) {
        self.points.push_back(point);
        self.prune(now);
    }

    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = self.cutoff(now);
        self.points.retain(|p| p.timestamp >= cutoff);
    }

    pub fn points(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
