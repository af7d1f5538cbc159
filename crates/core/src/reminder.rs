//! Reminder offsets and due-pair selection.
//!
//! An offset is a named duration before `scheduled_at` at which a reminder
//! should fire (e.g. `"24h"`). Selection is pure: the server reads one
//! consistent batch of candidate visits and this module decides which
//! `(visit, offset)` pairs are due right now.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::types::{VisitId, VisitStatus};
use crate::visit::Visit;

/// A named duration before the scheduled time at which a reminder fires.
///
/// The id doubles as the de-duplication key stored in
/// [`Visit::reminders_sent`], so it must be stable across deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderOffset {
    id: String,
    before: Duration,
}

/// Errors from parsing offset specs like `"24h"` or `"24h,1h"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OffsetParseError {
    /// The spec string was empty or had an empty element.
    #[error("offset spec cannot be empty")]
    Empty,
    /// The spec did not match `<number><m|h|d>`.
    #[error("invalid offset spec {0:?}: expected <number><m|h|d>, e.g. 24h")]
    Malformed(String),
    /// The numeric part was zero or did not fit.
    #[error("offset {0:?} must be a positive duration")]
    NonPositive(String),
    /// The same offset id appeared twice in a list.
    #[error("duplicate offset id {0:?}")]
    Duplicate(String),
}

impl ReminderOffset {
    /// Build an offset from an explicit id and duration.
    #[must_use]
    pub fn new(id: impl Into<String>, before: Duration) -> Self {
        Self {
            id: id.into(),
            before,
        }
    }

    /// Parse a single compact spec: `"24h"`, `"90m"`, `"2d"`.
    ///
    /// The spec string itself becomes the offset id.
    ///
    /// # Errors
    ///
    /// Returns [`OffsetParseError`] for empty, malformed, or non-positive
    /// specs.
    pub fn parse(spec: &str) -> Result<Self, OffsetParseError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(OffsetParseError::Empty);
        }

        let (number, to_duration): (&str, fn(i64) -> Duration) =
            if let Some(n) = spec.strip_suffix('m') {
                (n, Duration::minutes)
            } else if let Some(n) = spec.strip_suffix('h') {
                (n, Duration::hours)
            } else if let Some(n) = spec.strip_suffix('d') {
                (n, Duration::days)
            } else {
                return Err(OffsetParseError::Malformed(spec.to_owned()));
            };

        let value: i64 = number
            .parse()
            .map_err(|_| OffsetParseError::Malformed(spec.to_owned()))?;
        if value <= 0 {
            return Err(OffsetParseError::NonPositive(spec.to_owned()));
        }
        let before = to_duration(value);

        Ok(Self {
            id: spec.to_owned(),
            before,
        })
    }

    /// Stable identifier, also the de-duplication key.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// How long before `scheduled_at` this reminder fires.
    #[must_use]
    pub const fn before(&self) -> Duration {
        self.before
    }
}

/// Parse an ordered comma-separated offset list, e.g. `"24h,1h"`.
///
/// Order is preserved: it determines dispatch order within a visit.
///
/// # Errors
///
/// Returns [`OffsetParseError`] on any invalid element or duplicate id.
pub fn parse_offsets(csv: &str) -> Result<Vec<ReminderOffset>, OffsetParseError> {
    let mut offsets: Vec<ReminderOffset> = Vec::new();
    for spec in csv.split(',') {
        let offset = ReminderOffset::parse(spec)?;
        if offsets.iter().any(|o| o.id == offset.id) {
            return Err(OffsetParseError::Duplicate(offset.id));
        }
        offsets.push(offset);
    }
    if offsets.is_empty() {
        return Err(OffsetParseError::Empty);
    }
    Ok(offsets)
}

/// The longest configured offset; bounds the selector's candidate read.
#[must_use]
pub fn max_offset(offsets: &[ReminderOffset]) -> Duration {
    offsets
        .iter()
        .map(ReminderOffset::before)
        .max()
        .unwrap_or_else(Duration::zero)
}

/// A `(visit, offset)` pair whose reminder window has opened and has not
/// yet been sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    /// The visit to remind.
    pub visit_id: VisitId,
    /// Which configured offset fired.
    pub offset_id: String,
}

/// Offset ids due for a single visit at `now`.
///
/// An offset is due when the visit is `Scheduled`,
/// `scheduled_at - offset <= now < scheduled_at`, and the offset id is not
/// already in `reminders_sent`.
#[must_use]
pub fn due_offsets<'a>(
    visit: &Visit,
    offsets: &'a [ReminderOffset],
    now: DateTime<Utc>,
) -> Vec<&'a ReminderOffset> {
    if visit.status != VisitStatus::Scheduled || now >= visit.scheduled_at {
        return Vec::new();
    }

    offsets
        .iter()
        .filter(|offset| {
            visit.scheduled_at - offset.before <= now && !visit.reminder_sent(&offset.id)
        })
        .collect()
}

/// Select all due `(visit, offset)` pairs from one consistent batch.
///
/// Output is ordered by `scheduled_at` ascending, then by configured
/// offset order, so batches are deterministic and reproducible.
#[must_use]
pub fn select_due(
    visits: &[Visit],
    offsets: &[ReminderOffset],
    now: DateTime<Utc>,
) -> Vec<DueReminder> {
    let mut ordered: Vec<&Visit> = visits.iter().collect();
    ordered.sort_by_key(|v| v.scheduled_at);

    ordered
        .iter()
        .flat_map(|visit| {
            due_offsets(visit, offsets, now)
                .into_iter()
                .map(|offset| DueReminder {
                    visit_id: visit.id,
                    offset_id: offset.id.clone(),
                })
        })
        .collect()
}
