//! The visit snapshot and its state machine.
//!
//! All operations are pure: they take the current snapshot (and, where
//! relevant, the current instant) and return the new snapshot. Persisting
//! the result is the caller's responsibility, guarded by a conditional
//! write on the prior state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CustomerId, StoreId, VisitId, VisitStatus};

/// A scheduled store visit, as read from the visit store.
///
/// Invariants (upheld by the state machine, asserted in tests):
/// - `discount_unlocked` is true iff `status == Completed`
/// - `actual_visit` is `Some` iff `status == Completed`
/// - an offset id appears at most once in `reminders_sent`
/// - `scheduled_at` never changes after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    /// Unique visit ID, minted by the booking flow.
    pub id: VisitId,
    /// Customer who booked the visit.
    pub customer_id: CustomerId,
    /// Store the visit was booked at.
    pub store_id: StoreId,
    /// Instant the customer committed to visit.
    pub scheduled_at: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: VisitStatus,
    /// True only once the visit completed.
    pub discount_unlocked: bool,
    /// Instant the visit was confirmed complete.
    pub actual_visit: Option<DateTime<Utc>>,
    /// Offset ids already dispatched for this visit.
    pub reminders_sent: Vec<String>,
    /// When the visit row was created.
    pub created_at: DateTime<Utc>,
    /// Touched by the storage layer on every write.
    pub updated_at: DateTime<Utc>,
}

/// An attempted state change violated the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The visit is not in a state the action is legal from.
    #[error("cannot {action} visit in status {status}")]
    InvalidState {
        /// Status the visit was in.
        status: VisitStatus,
        /// Action that was attempted.
        action: &'static str,
    },
    /// `mark_missed` was requested while the arrival window is still open.
    #[error("arrival window is open until {closes_at}; cannot mark missed yet")]
    WindowStillOpen {
        /// When the window (scheduled time + grace period) closes.
        closes_at: DateTime<Utc>,
    },
}

impl Visit {
    /// When the allowed arrival window closes: `scheduled_at + grace`.
    #[must_use]
    pub fn window_closes_at(&self, grace: Duration) -> DateTime<Utc> {
        self.scheduled_at + grace
    }

    /// Whether the visit is still `Scheduled` but its arrival window has
    /// elapsed, making it eligible for the reconciliation sweep.
    #[must_use]
    pub fn is_lapsed(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.status == VisitStatus::Scheduled && now > self.window_closes_at(grace)
    }

    /// Confirm the customer showed up.
    ///
    /// Legal only from `Scheduled`. Unlocks the discount and records the
    /// confirmation instant.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::InvalidState`] if the visit is already
    /// in a terminal state.
    pub fn complete(mut self, now: DateTime<Utc>) -> Result<Self, TransitionError> {
        if self.status != VisitStatus::Scheduled {
            return Err(TransitionError::InvalidState {
                status: self.status,
                action: "complete",
            });
        }
        self.status = VisitStatus::Completed;
        self.discount_unlocked = true;
        self.actual_visit = Some(now);
        Ok(self)
    }

    /// Call the visit off.
    ///
    /// Legal only from `Scheduled`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::InvalidState`] if the visit is already
    /// in a terminal state.
    pub fn cancel(mut self) -> Result<Self, TransitionError> {
        if self.status != VisitStatus::Scheduled {
            return Err(TransitionError::InvalidState {
                status: self.status,
                action: "cancel",
            });
        }
        self.status = VisitStatus::Cancelled;
        Ok(self)
    }

    /// Mark the visit missed after its arrival window elapsed.
    ///
    /// Legal only from `Scheduled`, and only once `now` is past
    /// `scheduled_at + grace`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::InvalidState`] from a terminal state, or
    /// [`TransitionError::WindowStillOpen`] while the window is open.
    pub fn mark_missed(
        mut self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<Self, TransitionError> {
        if self.status != VisitStatus::Scheduled {
            return Err(TransitionError::InvalidState {
                status: self.status,
                action: "mark missed",
            });
        }
        let closes_at = self.window_closes_at(grace);
        if now <= closes_at {
            return Err(TransitionError::WindowStillOpen { closes_at });
        }
        self.status = VisitStatus::Missed;
        Ok(self)
    }

    /// Record that a reminder went out for `offset_id`.
    ///
    /// Idempotent: a duplicate offset id is a no-op, never an error.
    #[must_use]
    pub fn record_reminder_sent(mut self, offset_id: &str) -> Self {
        if !self.reminders_sent.iter().any(|o| o == offset_id) {
            self.reminders_sent.push(offset_id.to_owned());
        }
        self
    }

    /// Whether a reminder for `offset_id` was already dispatched.
    #[must_use]
    pub fn reminder_sent(&self, offset_id: &str) -> bool {
        self.reminders_sent.iter().any(|o| o == offset_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scheduled_visit(scheduled_at: DateTime<Utc>) -> Visit {
        Visit {
            id: VisitId::random(),
            customer_id: CustomerId::new(1),
            store_id: StoreId::new(1),
            scheduled_at,
            status: VisitStatus::Scheduled,
            discount_unlocked: false,
            actual_visit: None,
            reminders_sent: Vec::new(),
            created_at: scheduled_at - Duration::days(3),
            updated_at: scheduled_at - Duration::days(3),
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-14T15:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_complete_unlocks_discount_and_records_time() {
        let now = t0();
        let visit = scheduled_visit(now + Duration::minutes(10))
            .complete(now)
            .unwrap();

        assert_eq!(visit.status, VisitStatus::Completed);
        assert!(visit.discount_unlocked);
        assert_eq!(visit.actual_visit, Some(now));
    }

    #[test]
    fn test_complete_then_cancel_fails() {
        let now = t0();
        let visit = scheduled_visit(now).complete(now).unwrap();
        let err = visit.cancel().unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidState {
                status: VisitStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn test_cancel_then_complete_fails() {
        let now = t0();
        let visit = scheduled_visit(now).cancel().unwrap();
        let err = visit.complete(now).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidState {
                status: VisitStatus::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn test_mark_missed_requires_window_elapsed() {
        let scheduled_at = t0();
        let grace = Duration::hours(1);

        // Still inside the window (including the boundary instant).
        let visit = scheduled_visit(scheduled_at);
        let err = visit
            .clone()
            .mark_missed(scheduled_at + grace, grace)
            .unwrap_err();
        assert!(matches!(err, TransitionError::WindowStillOpen { .. }));

        // Past the window.
        let missed = visit
            .mark_missed(scheduled_at + grace + Duration::seconds(1), grace)
            .unwrap();
        assert_eq!(missed.status, VisitStatus::Missed);
        assert!(!missed.discount_unlocked);
        assert!(missed.actual_visit.is_none());
    }

    #[test]
    fn test_mark_missed_from_terminal_fails() {
        let now = t0();
        let grace = Duration::hours(1);
        let visit = scheduled_visit(now - Duration::hours(3)).cancel().unwrap();
        let err = visit.mark_missed(now, grace).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidState { .. }));
    }

    #[test]
    fn test_record_reminder_sent_is_idempotent() {
        let visit = scheduled_visit(t0())
            .record_reminder_sent("24h")
            .record_reminder_sent("1h")
            .record_reminder_sent("24h");

        assert_eq!(visit.reminders_sent, vec!["24h", "1h"]);
        assert!(visit.reminder_sent("24h"));
        assert!(!visit.reminder_sent("10m"));
    }

    #[test]
    fn test_is_lapsed() {
        let scheduled_at = t0();
        let grace = Duration::hours(1);
        let visit = scheduled_visit(scheduled_at);

        assert!(!visit.is_lapsed(scheduled_at + Duration::minutes(30), grace));
        assert!(!visit.is_lapsed(scheduled_at + grace, grace));
        assert!(visit.is_lapsed(scheduled_at + Duration::hours(2), grace));

        let completed = visit.complete(scheduled_at).unwrap();
        assert!(!completed.is_lapsed(scheduled_at + Duration::hours(2), grace));
    }

    /// Invariant check over random transition sequences: whatever order of
    /// actions is attempted, `discount_unlocked` and `actual_visit` track
    /// `Completed` exactly, and terminal states never change.
    #[test]
    fn test_invariants_hold_over_random_sequences() {
        use rand::Rng;

        let grace = Duration::hours(1);
        let scheduled_at = t0();
        let mut rng = rand::rng();

        for _ in 0..500 {
            let mut visit = scheduled_visit(scheduled_at);
            for step in 0..8 {
                let now = scheduled_at + Duration::minutes(rng.random_range(-120..240));
                let before = visit.clone();
                let result = match rng.random_range(0..4) {
                    0 => visit.clone().complete(now),
                    1 => visit.clone().cancel(),
                    2 => visit.clone().mark_missed(now, grace),
                    _ => Ok(visit.clone().record_reminder_sent("24h")),
                };

                if let Ok(next) = result {
                    visit = next;
                } else {
                    // Failed transitions must leave the snapshot untouched.
                    assert_eq!(visit, before, "step {step} mutated on error");
                }

                assert_eq!(
                    visit.discount_unlocked,
                    visit.status == VisitStatus::Completed
                );
                assert_eq!(
                    visit.actual_visit.is_some(),
                    visit.status == VisitStatus::Completed
                );
                assert_eq!(visit.scheduled_at, scheduled_at);
                if before.status.is_terminal() {
                    assert_eq!(visit.status, before.status);
                }
            }
        }
    }
}
