//! Database operations for scheduled visits.
//!
//! All state-changing queries are conditional writes: the `WHERE` clause
//! re-checks the expected prior state, and a result touching zero rows
//! means someone else already resolved the visit. Callers treat that as a
//! skip, never an error.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use footfall_core::types::{CustomerId, Email, StoreId, VisitId, VisitStatus};
use footfall_core::visit::Visit;

use super::RepositoryError;
use crate::store::ReminderTarget;

/// A visit row as stored in `PostgreSQL`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VisitRow {
    /// Unique visit ID.
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
    /// Offset ids already dispatched.
    pub reminders_sent: Vec<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl From<VisitRow> for Visit {
    fn from(row: VisitRow) -> Self {
        Self {
            id: row.id,
            customer_id: row.customer_id,
            store_id: row.store_id,
            scheduled_at: row.scheduled_at,
            status: row.status,
            discount_unlocked: row.discount_unlocked,
            actual_visit: row.actual_visit,
            reminders_sent: row.reminders_sent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A due-reminder candidate row: visit columns joined with the customer
/// contact and store name needed to render the notification.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DueCandidateRow {
    #[sqlx(flatten)]
    visit: VisitRow,
    customer_name: String,
    customer_email: Email,
    store_name: String,
}

impl From<DueCandidateRow> for ReminderTarget {
    fn from(row: DueCandidateRow) -> Self {
        Self {
            visit: row.visit.into(),
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            store_name: row.store_name,
        }
    }
}

const VISIT_COLUMNS: &str = "id, customer_id, store_id, scheduled_at, status, \
     discount_unlocked, actual_visit, reminders_sent, created_at, updated_at";

/// Parameters for creating a visit (seed tooling and tests; production
/// rows come from the booking flow).
pub struct CreateVisit {
    /// Customer booking the visit.
    pub customer_id: CustomerId,
    /// Store being visited.
    pub store_id: StoreId,
    /// Committed visit time.
    pub scheduled_at: DateTime<Utc>,
}

/// Insert a new visit in `SCHEDULED` state.
///
/// # Errors
///
/// Returns error if the database insert fails.
pub async fn insert_visit(
    pool: &PgPool,
    params: CreateVisit,
    now: DateTime<Utc>,
) -> Result<Visit, RepositoryError> {
    let row = sqlx::query_as::<_, VisitRow>(
        r"
        INSERT INTO visits (id, customer_id, store_id, scheduled_at, status,
                            discount_unlocked, reminders_sent, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 'SCHEDULED', FALSE, '{}', $5, $5)
        RETURNING id, customer_id, store_id, scheduled_at, status,
                  discount_unlocked, actual_visit, reminders_sent, created_at, updated_at
        ",
    )
    .bind(VisitId::random())
    .bind(params.customer_id)
    .bind(params.store_id)
    .bind(params.scheduled_at)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Get a visit by ID.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn get_visit(pool: &PgPool, id: VisitId) -> Result<Option<Visit>, RepositoryError> {
    let row = sqlx::query_as::<_, VisitRow>(&format!(
        "SELECT {VISIT_COLUMNS} FROM visits WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// One consistent read of reminder candidates: `SCHEDULED` visits whose
/// appointment falls inside `(now, window_end]`, joined with contact data.
///
/// Which offsets are actually due is decided in memory against this
/// single batch, so a pair dispatched earlier in the same run can never be
/// re-selected.
///
/// # Errors
///
/// Returns error if the database query fails.
pub async fn find_due_candidates(
    pool: &PgPool,
    now: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<Vec<ReminderTarget>, RepositoryError> {
    let rows = sqlx::query_as::<_, DueCandidateRow>(
        r"
        SELECT v.id, v.customer_id, v.store_id, v.scheduled_at, v.status,
               v.discount_unlocked, v.actual_visit, v.reminders_sent,
               v.created_at, v.updated_at,
               c.name AS customer_name, c.email AS customer_email,
               s.name AS store_name
        FROM visits v
        JOIN customers c ON c.id = v.customer_id
        JOIN stores s ON s.id = v.store_id
        WHERE v.status = 'SCHEDULED'
          AND v.scheduled_at > $1
          AND v.scheduled_at <= $2
        ORDER BY v.scheduled_at
        ",
    )
    .bind(now)
    .bind(window_end)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Mark every `SCHEDULED` visit whose arrival window closed before
/// `cutoff` (`cutoff = now - grace`) as `MISSED`, in one batched
/// conditional update.
///
/// Returns the number of visits swept. Visits a manual action resolves
/// concurrently simply fall out of the `WHERE` clause.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn sweep_lapsed(
    pool: &PgPool,
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE visits
        SET status = 'MISSED', updated_at = $1
        WHERE status = 'SCHEDULED' AND scheduled_at < $2
        ",
    )
    .bind(now)
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Complete a visit: unlock the discount and record the confirmation time.
///
/// Conditional on the visit still being `SCHEDULED`. Returns whether the
/// write was applied.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn complete_visit(
    pool: &PgPool,
    id: VisitId,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE visits
        SET status = 'COMPLETED', discount_unlocked = TRUE,
            actual_visit = $2, updated_at = $2
        WHERE id = $1 AND status = 'SCHEDULED'
        ",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Cancel a visit. Conditional on it still being `SCHEDULED`.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn cancel_visit(
    pool: &PgPool,
    id: VisitId,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE visits
        SET status = 'CANCELLED', updated_at = $2
        WHERE id = $1 AND status = 'SCHEDULED'
        ",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a visit missed. Conditional on it still being `SCHEDULED` and its
/// arrival window having closed before `cutoff` (`cutoff = now - grace`),
/// so a concurrent completion or a mistimed caller touches zero rows.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn mark_visit_missed(
    pool: &PgPool,
    id: VisitId,
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE visits
        SET status = 'MISSED', updated_at = $2
        WHERE id = $1 AND status = 'SCHEDULED' AND scheduled_at < $3
        ",
    )
    .bind(id)
    .bind(now)
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record that a reminder for `offset_id` went out.
///
/// Conditional on the visit still being `SCHEDULED` and the offset not
/// already recorded; the array membership check makes overlapping trigger
/// runs converge on exactly one recorded send per offset.
///
/// # Errors
///
/// Returns error if the database update fails.
pub async fn append_reminder_sent(
    pool: &PgPool,
    id: VisitId,
    offset_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE visits
        SET reminders_sent = array_append(reminders_sent, $2), updated_at = $3
        WHERE id = $1 AND status = 'SCHEDULED' AND NOT ($2 = ANY(reminders_sent))
        ",
    )
    .bind(id)
    .bind(offset_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
