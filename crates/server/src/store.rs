//! The narrow visit-store interface consumed by the reminder engine and
//! the lifecycle service.
//!
//! The engine never issues queries beyond these shapes; tests substitute
//! an in-memory implementation to drive time-dependent scenarios without
//! a database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use footfall_core::types::{Email, VisitId};
use footfall_core::visit::Visit;

use crate::db::{self, RepositoryError};

/// A visit plus the contact context needed to render its reminder.
#[derive(Debug, Clone)]
pub struct ReminderTarget {
    /// The visit snapshot.
    pub visit: Visit,
    /// Customer display name.
    pub customer_name: String,
    /// Where the reminder goes.
    pub customer_email: Email,
    /// Store display name for the message body.
    pub store_name: String,
}

/// Durable record of visits, consumed through conditional writes only.
///
/// Every mutation re-checks the expected prior state and reports whether
/// it was applied; `Ok(false)` means another writer got there first and
/// the caller should treat the operation as already done.
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// One consistent read of `SCHEDULED` visits with `scheduled_at` in
    /// `(now, now + horizon]`, joined with reminder contact data.
    async fn find_due_candidates(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<Vec<ReminderTarget>, RepositoryError>;

    /// Mark every `SCHEDULED` visit whose arrival window
    /// (`scheduled_at + grace`) has elapsed at `now` as `MISSED`, as one
    /// batched conditional update. Returns the number swept.
    async fn sweep_lapsed(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<u64, RepositoryError>;

    /// Fetch a single visit.
    async fn get(&self, id: VisitId) -> Result<Option<Visit>, RepositoryError>;

    /// Conditionally complete a `SCHEDULED` visit.
    async fn complete(&self, id: VisitId, now: DateTime<Utc>) -> Result<bool, RepositoryError>;

    /// Conditionally cancel a `SCHEDULED` visit.
    async fn cancel(&self, id: VisitId, now: DateTime<Utc>) -> Result<bool, RepositoryError>;

    /// Conditionally mark a lapsed `SCHEDULED` visit as missed.
    async fn mark_missed(
        &self,
        id: VisitId,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<bool, RepositoryError>;

    /// Conditionally record a dispatched reminder offset.
    async fn record_reminder_sent(
        &self,
        id: VisitId,
        offset_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

/// `PostgreSQL`-backed visit store.
#[derive(Clone)]
pub struct PgVisitStore {
    pool: PgPool,
}

impl PgVisitStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VisitStore for PgVisitStore {
    async fn find_due_candidates(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<Vec<ReminderTarget>, RepositoryError> {
        db::visits::find_due_candidates(&self.pool, now, now + horizon).await
    }

    async fn sweep_lapsed(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<u64, RepositoryError> {
        db::visits::sweep_lapsed(&self.pool, now, now - grace).await
    }

    async fn get(&self, id: VisitId) -> Result<Option<Visit>, RepositoryError> {
        db::visits::get_visit(&self.pool, id).await
    }

    async fn complete(&self, id: VisitId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        db::visits::complete_visit(&self.pool, id, now).await
    }

    async fn cancel(&self, id: VisitId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        db::visits::cancel_visit(&self.pool, id, now).await
    }

    async fn mark_missed(
        &self,
        id: VisitId,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<bool, RepositoryError> {
        db::visits::mark_visit_missed(&self.pool, id, now, now - grace).await
    }

    async fn record_reminder_sent(
        &self,
        id: VisitId,
        offset_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        db::visits::append_reminder_sent(&self.pool, id, offset_id, now).await
    }
}
