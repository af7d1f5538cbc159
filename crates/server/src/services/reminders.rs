//! The reminder engine: one trigger cycle of sweep, selection, and
//! dispatch.
//!
//! The engine is stateless between invocations and safe under overlapping
//! triggers: every per-visit write is conditioned on the expected prior
//! state, so a second run's duplicate work degrades to skips instead of
//! double sends or double transitions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout_at;
use tracing::{debug, error, info, instrument, warn};

use footfall_core::reminder::{self, DueReminder, ReminderOffset};
use footfall_core::types::VisitId;

use crate::config::ReminderConfig;
use crate::db::RepositoryError;
use crate::services::notify::Notifier;
use crate::store::{ReminderTarget, VisitStore};

/// Aggregate result of one trigger cycle.
///
/// Always reflects whatever phases completed; `error` is set when a phase
/// aborted (storage failure or the run deadline), leaving earlier phases'
/// counts intact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutcome {
    /// Instant the cycle was started with.
    pub timestamp: DateTime<Utc>,
    /// Visits transitioned to `MISSED` by the reconciliation sweep.
    pub swept: u64,
    /// Reminders sent and recorded.
    pub sent: u64,
    /// Sends that failed or timed out; retried next cycle.
    pub failed: u64,
    /// Pairs found already recorded mid-run (lost race with another run).
    pub skipped: u64,
    /// Visits with at least one failed send, for observability.
    pub failed_visit_ids: Vec<VisitId>,
    /// Set when a phase aborted before the cycle finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleOutcome {
    fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            swept: 0,
            sent: 0,
            failed: 0,
            skipped: 0,
            failed_visit_ids: Vec::new(),
            error: None,
        }
    }
}

/// Per-pair dispatch result.
enum SendOutcome {
    Sent,
    Failed,
    Skipped,
}

#[derive(Default)]
struct DispatchSummary {
    sent: u64,
    failed: u64,
    skipped: u64,
    failed_visit_ids: Vec<VisitId>,
}

/// Drives one reminder cycle against a [`VisitStore`] and a [`Notifier`].
pub struct ReminderEngine {
    store: Arc<dyn VisitStore>,
    notifier: Arc<dyn Notifier>,
    offsets: Vec<ReminderOffset>,
    grace: chrono::Duration,
    concurrency: usize,
    send_timeout: std::time::Duration,
    run_deadline: std::time::Duration,
}

impl ReminderEngine {
    /// Create an engine from the reminder configuration.
    #[must_use]
    pub fn new(
        store: Arc<dyn VisitStore>,
        notifier: Arc<dyn Notifier>,
        config: &ReminderConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            offsets: config.offsets.clone(),
            grace: config.grace,
            concurrency: config.concurrency,
            send_timeout: config.send_timeout,
            run_deadline: config.run_deadline,
        }
    }

    /// Run one full cycle: sweep lapsed visits, select due reminders,
    /// dispatch them.
    ///
    /// Never returns an error: a phase that aborts is recorded in the
    /// outcome's `error` field alongside the counts of everything that
    /// did complete, and in-flight conditional writes remain valid.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleOutcome {
        let deadline = tokio::time::Instant::now() + self.run_deadline;
        let mut outcome = CycleOutcome::new(now);

        // Phase 1: reconciliation sweep, so lapsed visits are never also
        // considered for a reminder below.
        match timeout_at(deadline, self.sweep(now)).await {
            Ok(Ok(swept)) => outcome.swept = swept,
            Ok(Err(e)) => {
                error!(error = %e, "Reconciliation sweep aborted");
                outcome.error = Some(format!("sweep aborted: {e}"));
                return outcome;
            }
            Err(_) => {
                warn!("Run deadline exceeded during sweep");
                outcome.error = Some("run deadline exceeded during sweep".to_string());
                return outcome;
            }
        }

        // Phase 2: one consistent read of due pairs.
        let (targets, due) = match timeout_at(deadline, self.select_due(now)).await {
            Ok(Ok(batch)) => batch,
            Ok(Err(e)) => {
                error!(error = %e, "Reminder selection aborted");
                outcome.error = Some(format!("selection aborted: {e}"));
                return outcome;
            }
            Err(_) => {
                warn!("Run deadline exceeded during selection");
                outcome.error = Some("run deadline exceeded during selection".to_string());
                return outcome;
            }
        };

        // Phase 3: bounded fan-out to the notification provider.
        match timeout_at(deadline, self.dispatch(targets, due, now)).await {
            Ok(summary) => {
                outcome.sent = summary.sent;
                outcome.failed = summary.failed;
                outcome.skipped = summary.skipped;
                outcome.failed_visit_ids = summary.failed_visit_ids;
            }
            Err(_) => {
                warn!("Run deadline exceeded during dispatch");
                outcome.error = Some("run deadline exceeded during dispatch".to_string());
            }
        }

        info!(
            swept = outcome.swept,
            sent = outcome.sent,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "Reminder cycle finished"
        );
        outcome
    }

    /// Mark every lapsed `SCHEDULED` visit as `MISSED` in one batched
    /// conditional update.
    ///
    /// A visit that a manual action resolves concurrently simply falls
    /// out of the update's condition; only the rows actually transitioned
    /// are counted.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let swept = self.store.sweep_lapsed(now, self.grace).await?;
        if swept > 0 {
            debug!(swept, "Marked lapsed visits missed");
        }
        Ok(swept)
    }

    /// One consistent read of candidates, then pure due-pair selection.
    /// Issues no writes.
    async fn select_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(Vec<ReminderTarget>, Vec<DueReminder>), RepositoryError> {
        let horizon = reminder::max_offset(&self.offsets);
        let targets = self.store.find_due_candidates(now, horizon).await?;

        let visits: Vec<_> = targets.iter().map(|t| t.visit.clone()).collect();
        let due = reminder::select_due(&visits, &self.offsets, now);

        debug!(candidates = targets.len(), due = due.len(), "Selected due reminders");
        Ok((targets, due))
    }

    /// Send each due pair through the provider with bounded concurrency,
    /// recording successes conditionally.
    ///
    /// Failure domains are isolated per pair: a timeout, provider
    /// rejection, or lost record race affects only that pair's counts.
    async fn dispatch(
        &self,
        targets: Vec<ReminderTarget>,
        due: Vec<DueReminder>,
        now: DateTime<Utc>,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        if due.is_empty() {
            return summary;
        }

        let by_id: HashMap<VisitId, ReminderTarget> =
            targets.into_iter().map(|t| (t.visit.id, t)).collect();

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(DueReminder, SendOutcome)> = JoinSet::new();

        for pair in due {
            // Selection is derived from `targets`, so the lookup holds.
            let Some(target) = by_id.get(&pair.visit_id).cloned() else {
                continue;
            };
            let store = Arc::clone(&self.store);
            let notifier = Arc::clone(&self.notifier);
            let semaphore = Arc::clone(&semaphore);
            let send_timeout = self.send_timeout;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (pair, SendOutcome::Failed);
                };

                match tokio::time::timeout(
                    send_timeout,
                    notifier.send(&target, &pair.offset_id),
                )
                .await
                {
                    Ok(Ok(())) => {
                        match store
                            .record_reminder_sent(pair.visit_id, &pair.offset_id, now)
                            .await
                        {
                            Ok(true) => (pair, SendOutcome::Sent),
                            Ok(false) => {
                                info!(
                                    visit_id = %pair.visit_id,
                                    offset = %pair.offset_id,
                                    "Reminder already recorded by another run"
                                );
                                (pair, SendOutcome::Skipped)
                            }
                            Err(e) => {
                                error!(
                                    visit_id = %pair.visit_id,
                                    offset = %pair.offset_id,
                                    error = %e,
                                    "Failed to record sent reminder"
                                );
                                (pair, SendOutcome::Failed)
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(
                            visit_id = %pair.visit_id,
                            offset = %pair.offset_id,
                            error = %e,
                            "Reminder send failed; will retry next cycle"
                        );
                        (pair, SendOutcome::Failed)
                    }
                    Err(_) => {
                        warn!(
                            visit_id = %pair.visit_id,
                            offset = %pair.offset_id,
                            "Reminder send timed out; will retry next cycle"
                        );
                        (pair, SendOutcome::Failed)
                    }
                }
            });
        }

        let mut failed_seen: HashSet<VisitId> = HashSet::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pair, SendOutcome::Sent)) => {
                    summary.sent += 1;
                    debug!(visit_id = %pair.visit_id, offset = %pair.offset_id, "Reminder dispatched");
                }
                Ok((pair, SendOutcome::Skipped)) => {
                    summary.skipped += 1;
                    debug!(visit_id = %pair.visit_id, offset = %pair.offset_id, "Reminder skipped");
                }
                Ok((pair, SendOutcome::Failed)) => {
                    summary.failed += 1;
                    if failed_seen.insert(pair.visit_id) {
                        summary.failed_visit_ids.push(pair.visit_id);
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(error = %e, "Reminder dispatch task failed to join");
                }
            }
        }

        summary
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_outcome_wire_format() {
        let mut outcome = CycleOutcome::new(
            DateTime::parse_from_rfc3339("2026-03-14T15:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        outcome.swept = 2;
        outcome.sent = 3;
        outcome.failed = 1;
        outcome.failed_visit_ids.push(VisitId::random());

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["swept"], 2);
        assert_eq!(json["sent"], 3);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["skipped"], 0);
        assert_eq!(json["failedVisitIds"].as_array().unwrap().len(), 1);
        // No error field when every phase completed.
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_cycle_outcome_error_field_serialized_when_set() {
        let mut outcome = CycleOutcome::new(Utc::now());
        outcome.error = Some("sweep aborted: database error".to_string());

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["error"], "sweep aborted: database error");
    }
}
