//! Integration tests for manual visit actions and their races with the
//! reconciliation sweep: exactly one terminal state, first write wins.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use footfall_core::types::{Email, ManagerId, StoreId, VisitId, VisitStatus};
use footfall_core::visit::Visit;
use footfall_server::db::RepositoryError;
use footfall_server::error::AppError;
use footfall_server::models::CurrentManager;
use footfall_server::services::{LifecycleService, ReminderEngine};
use footfall_server::store::{ReminderTarget, VisitStore};

use footfall_integration_tests::{
    MemoryVisitStore, RecordingNotifier, reminder_config, scheduled_visit,
};

fn t() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-14T15:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn manager_of(store_id: StoreId) -> CurrentManager {
    CurrentManager {
        id: ManagerId::new(1),
        email: Email::parse("manager@footfall.test").unwrap(),
        name: "Sam Okafor".to_string(),
        store_id,
    }
}

fn grace() -> Duration {
    Duration::hours(1)
}

#[tokio::test]
async fn test_manual_complete_unlocks_discount() {
    let store = Arc::new(MemoryVisitStore::new());
    let service = LifecycleService::new(store.clone(), grace());
    let manager = manager_of(StoreId::new(1));

    let visit = scheduled_visit(StoreId::new(1), t());
    let id = visit.id;
    store.insert(visit);

    let outcome = service
        .set_status(&manager, id, VisitStatus::Completed, t() - Duration::minutes(5))
        .await
        .unwrap();

    assert!(outcome.applied);
    assert_eq!(outcome.visit.status, VisitStatus::Completed);
    assert!(outcome.visit.discount_unlocked);
    assert_eq!(outcome.visit.actual_visit, Some(t() - Duration::minutes(5)));
}

#[tokio::test]
async fn test_manual_action_on_terminal_visit_is_invalid_transition() {
    let store = Arc::new(MemoryVisitStore::new());
    let service = LifecycleService::new(store.clone(), grace());
    let manager = manager_of(StoreId::new(1));

    let visit = scheduled_visit(StoreId::new(1), t());
    let id = visit.id;
    store.insert(visit);

    service
        .set_status(&manager, id, VisitStatus::Cancelled, t())
        .await
        .unwrap();

    // Second action on the now-terminal visit is rejected precisely.
    let err = service
        .set_status(&manager, id, VisitStatus::Completed, t())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    assert_eq!(store.visit(id).unwrap().status, VisitStatus::Cancelled);
}

#[tokio::test]
async fn test_manual_missed_requires_lapsed_window() {
    let store = Arc::new(MemoryVisitStore::new());
    let service = LifecycleService::new(store.clone(), grace());
    let manager = manager_of(StoreId::new(1));

    let scheduled_at = t();
    let visit = scheduled_visit(StoreId::new(1), scheduled_at);
    let id = visit.id;
    store.insert(visit);

    // Window still open: rejected.
    let err = service
        .set_status(
            &manager,
            id,
            VisitStatus::Missed,
            scheduled_at + Duration::minutes(30),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    // Window closed: applied.
    let outcome = service
        .set_status(
            &manager,
            id,
            VisitStatus::Missed,
            scheduled_at + Duration::hours(2),
        )
        .await
        .unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.visit.status, VisitStatus::Missed);
}

#[tokio::test]
async fn test_scheduled_target_is_rejected() {
    let store = Arc::new(MemoryVisitStore::new());
    let service = LifecycleService::new(store.clone(), grace());
    let manager = manager_of(StoreId::new(1));

    let visit = scheduled_visit(StoreId::new(1), t());
    let id = visit.id;
    store.insert(visit);

    let err = service
        .set_status(&manager, id, VisitStatus::Scheduled, t())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_foreign_store_manager_is_forbidden() {
    let store = Arc::new(MemoryVisitStore::new());
    let service = LifecycleService::new(store.clone(), grace());
    let other_manager = manager_of(StoreId::new(2));

    let visit = scheduled_visit(StoreId::new(1), t());
    let id = visit.id;
    store.insert(visit);

    let err = service
        .set_status(&other_manager, id, VisitStatus::Completed, t())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(store.visit(id).unwrap().status, VisitStatus::Scheduled);

    let err = service.get_visit(&other_manager, id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_unknown_visit_is_not_found() {
    let store = Arc::new(MemoryVisitStore::new());
    let service = LifecycleService::new(store.clone(), grace());
    let manager = manager_of(StoreId::new(1));

    let err = service
        .set_status(&manager, VisitId::random(), VisitStatus::Completed, t())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

/// Scenario: the sweep lands first, then the manager tries to complete.
/// The visit ends in exactly one terminal state (`MISSED`) and the manual
/// caller gets a precise rejection.
#[tokio::test]
async fn test_sweep_wins_race_then_manual_complete_rejected() {
    let scheduled_at = t();
    let now = scheduled_at + Duration::hours(2);

    let store = Arc::new(MemoryVisitStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = ReminderEngine::new(
        store.clone(),
        notifier,
        &reminder_config("24h,1h", grace(), 8),
    );
    let service = LifecycleService::new(store.clone(), grace());
    let manager = manager_of(StoreId::new(1));

    let visit = scheduled_visit(StoreId::new(1), scheduled_at);
    let id = visit.id;
    store.insert(visit);

    let outcome = engine.run_cycle(now).await;
    assert_eq!(outcome.swept, 1);

    let err = service
        .set_status(&manager, id, VisitStatus::Completed, now)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    assert_eq!(store.visit(id).unwrap().status, VisitStatus::Missed);
}

/// Scenario: the manager completes first; the sweep's conditional write
/// then touches nothing. Exactly one terminal state (`COMPLETED`).
#[tokio::test]
async fn test_manual_complete_wins_race_then_sweep_skips() {
    let scheduled_at = t();
    let now = scheduled_at + Duration::hours(2);

    let store = Arc::new(MemoryVisitStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = ReminderEngine::new(
        store.clone(),
        notifier,
        &reminder_config("24h,1h", grace(), 8),
    );
    let service = LifecycleService::new(store.clone(), grace());
    let manager = manager_of(StoreId::new(1));

    let visit = scheduled_visit(StoreId::new(1), scheduled_at);
    let id = visit.id;
    store.insert(visit);

    let outcome = service
        .set_status(&manager, id, VisitStatus::Completed, now)
        .await
        .unwrap();
    assert!(outcome.applied);

    let outcome = engine.run_cycle(now).await;
    assert_eq!(outcome.swept, 0);

    let final_visit = store.visit(id).unwrap();
    assert_eq!(final_visit.status, VisitStatus::Completed);
    assert!(final_visit.discount_unlocked);
}

/// Store wrapper that lets the sweep land between the lifecycle service's
/// read and its conditional write, exercising the lost-race path.
struct SweepInterposingStore {
    inner: Arc<MemoryVisitStore>,
    grace: Duration,
}

#[async_trait]
impl VisitStore for SweepInterposingStore {
    async fn find_due_candidates(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<Vec<ReminderTarget>, RepositoryError> {
        self.inner.find_due_candidates(now, horizon).await
    }

    async fn sweep_lapsed(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<u64, RepositoryError> {
        self.inner.sweep_lapsed(now, grace).await
    }

    async fn get(&self, id: VisitId) -> Result<Option<Visit>, RepositoryError> {
        self.inner.get(id).await
    }

    async fn complete(&self, id: VisitId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        // The sweep resolves the visit while the manual write is in flight.
        self.inner.mark_missed(id, now, self.grace).await?;
        self.inner.complete(id, now).await
    }

    async fn cancel(&self, id: VisitId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        self.inner.cancel(id, now).await
    }

    async fn mark_missed(
        &self,
        id: VisitId,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<bool, RepositoryError> {
        self.inner.mark_missed(id, now, grace).await
    }

    async fn record_reminder_sent(
        &self,
        id: VisitId,
        offset_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.inner.record_reminder_sent(id, offset_id, now).await
    }
}

/// Scenario: the sweep lands between the manual read and the manual
/// write. The conditional write is a silent skip, and the response
/// reports the winning state with `applied: false`.
#[tokio::test]
async fn test_lost_race_reports_winning_state() {
    let scheduled_at = t();
    let now = scheduled_at + Duration::hours(2);

    let inner = Arc::new(MemoryVisitStore::new());
    let visit = scheduled_visit(StoreId::new(1), scheduled_at);
    let id = visit.id;
    inner.insert(visit);

    let store = Arc::new(SweepInterposingStore {
        inner: inner.clone(),
        grace: grace(),
    });
    let service = LifecycleService::new(store, grace());
    let manager = manager_of(StoreId::new(1));

    let outcome = service
        .set_status(&manager, id, VisitStatus::Completed, now)
        .await
        .unwrap();

    assert!(!outcome.applied);
    assert_eq!(outcome.visit.status, VisitStatus::Missed);
    assert!(!outcome.visit.discount_unlocked);
    assert_eq!(inner.visit(id).unwrap().status, VisitStatus::Missed);
}
