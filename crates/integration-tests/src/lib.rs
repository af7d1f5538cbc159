//! Shared test doubles for driving the reminder engine and lifecycle
//! service without a database or SMTP relay.
//!
//! [`MemoryVisitStore`] mirrors the conditional-write semantics of the
//! Postgres store: every mutation re-checks the expected prior state
//! under one lock, so optimistic-concurrency scenarios behave exactly
//! like the compare-and-swap SQL they stand in for.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used)] // test support code

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use footfall_core::types::{CustomerId, Email, StoreId, VisitId, VisitStatus};
use footfall_core::visit::Visit;
use footfall_server::config::ReminderConfig;
use footfall_server::db::RepositoryError;
use footfall_server::services::notify::{Notifier, NotifyError};
use footfall_server::store::{ReminderTarget, VisitStore};
use secrecy::SecretString;

/// A reminder configuration for engine tests.
#[must_use]
pub fn reminder_config(offsets: &str, grace: Duration, concurrency: usize) -> ReminderConfig {
    ReminderConfig {
        trigger_secret: SecretString::from("kY8v#mQ2pW5x!dT3"),
        offsets: footfall_core::reminder::parse_offsets(offsets).unwrap(),
        grace,
        concurrency,
        send_timeout: std::time::Duration::from_secs(5),
        run_deadline: std::time::Duration::from_secs(30),
    }
}

/// Build a `SCHEDULED` visit snapshot for tests.
#[must_use]
pub fn scheduled_visit(store_id: StoreId, scheduled_at: DateTime<Utc>) -> Visit {
    Visit {
        id: VisitId::random(),
        customer_id: CustomerId::new(1),
        store_id,
        scheduled_at,
        status: VisitStatus::Scheduled,
        discount_unlocked: false,
        actual_visit: None,
        reminders_sent: Vec::new(),
        created_at: scheduled_at - Duration::days(3),
        updated_at: scheduled_at - Duration::days(3),
    }
}

/// Wrap a visit with placeholder contact data.
#[must_use]
pub fn target_for(visit: Visit) -> ReminderTarget {
    ReminderTarget {
        visit,
        customer_name: "Ada Fenwick".to_string(),
        customer_email: Email::parse("ada@footfall.test").unwrap(),
        store_name: "Corner Market".to_string(),
    }
}

/// In-memory visit store with conditional-write semantics.
#[derive(Default)]
pub struct MemoryVisitStore {
    visits: Mutex<HashMap<VisitId, ReminderTarget>>,
    /// When set, `find_due_candidates` fails (phase isolation tests).
    pub fail_selection: AtomicBool,
    /// When set, `sweep_lapsed` fails (phase isolation tests).
    pub fail_sweep: AtomicBool,
}

impl MemoryVisitStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a visit with placeholder contact data.
    pub fn insert(&self, visit: Visit) {
        self.insert_target(target_for(visit));
    }

    /// Insert a full reminder target.
    pub fn insert_target(&self, target: ReminderTarget) {
        self.visits
            .lock()
            .unwrap()
            .insert(target.visit.id, target);
    }

    /// Current snapshot of a visit.
    #[must_use]
    pub fn visit(&self, id: VisitId) -> Option<Visit> {
        self.visits.lock().unwrap().get(&id).map(|t| t.visit.clone())
    }

    fn injected(flag: &AtomicBool) -> Result<(), RepositoryError> {
        if flag.load(Ordering::SeqCst) {
            return Err(RepositoryError::DataCorruption(
                "injected failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VisitStore for MemoryVisitStore {
    async fn find_due_candidates(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<Vec<ReminderTarget>, RepositoryError> {
        Self::injected(&self.fail_selection)?;
        let visits = self.visits.lock().unwrap();
        let mut candidates: Vec<_> = visits
            .values()
            .filter(|t| {
                t.visit.status == VisitStatus::Scheduled
                    && t.visit.scheduled_at > now
                    && t.visit.scheduled_at <= now + horizon
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|t| t.visit.scheduled_at);
        Ok(candidates)
    }

    async fn sweep_lapsed(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<u64, RepositoryError> {
        Self::injected(&self.fail_sweep)?;
        let mut visits = self.visits.lock().unwrap();
        let mut swept = 0u64;
        for target in visits.values_mut() {
            if target.visit.is_lapsed(now, grace) {
                if let Ok(updated) = target.visit.clone().mark_missed(now, grace) {
                    target.visit = updated;
                    swept += 1;
                }
            }
        }
        Ok(swept)
    }

    async fn get(&self, id: VisitId) -> Result<Option<Visit>, RepositoryError> {
        Ok(self.visit(id))
    }

    async fn complete(&self, id: VisitId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut visits = self.visits.lock().unwrap();
        let Some(target) = visits.get_mut(&id) else {
            return Ok(false);
        };
        match target.visit.clone().complete(now) {
            Ok(updated) => {
                target.visit = updated;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn cancel(&self, id: VisitId, _now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut visits = self.visits.lock().unwrap();
        let Some(target) = visits.get_mut(&id) else {
            return Ok(false);
        };
        match target.visit.clone().cancel() {
            Ok(updated) => {
                target.visit = updated;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn mark_missed(
        &self,
        id: VisitId,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<bool, RepositoryError> {
        let mut visits = self.visits.lock().unwrap();
        let Some(target) = visits.get_mut(&id) else {
            return Ok(false);
        };
        match target.visit.clone().mark_missed(now, grace) {
            Ok(updated) => {
                target.visit = updated;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn record_reminder_sent(
        &self,
        id: VisitId,
        offset_id: &str,
        _now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut visits = self.visits.lock().unwrap();
        let Some(target) = visits.get_mut(&id) else {
            return Ok(false);
        };
        if target.visit.status != VisitStatus::Scheduled || target.visit.reminder_sent(offset_id) {
            return Ok(false);
        }
        target.visit = target.visit.clone().record_reminder_sent(offset_id);
        Ok(true)
    }
}

/// Recording notifier with optional per-visit failures and send latency.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(VisitId, String)>>,
    failing: Mutex<Vec<VisitId>>,
    /// Simulated provider latency per send.
    pub latency: Option<std::time::Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends for `id` fail until [`Self::clear_failures`].
    pub fn fail_for(&self, id: VisitId) {
        self.failing.lock().unwrap().push(id);
    }

    /// Stop injecting provider failures.
    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Every `(visit, offset)` pair handed to the provider, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<(VisitId, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Highest number of concurrently in-flight sends observed.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, target: &ReminderTarget, offset_id: &str) -> Result<(), NotifyError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(&target.visit.id) {
            return Err(NotifyError::InvalidAddress(
                "injected provider failure".to_string(),
            ));
        }

        self.sent
            .lock()
            .unwrap()
            .push((target.visit.id, offset_id.to_string()));
        Ok(())
    }
}
