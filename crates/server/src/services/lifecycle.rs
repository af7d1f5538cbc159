//! Manual visit lifecycle actions (store-manager initiated).
//!
//! The automated sweep only ever requests legal transitions; this service
//! is the one place that has to turn an arbitrary requested status into
//! either a precise validation error or a conditional write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use footfall_core::types::{VisitId, VisitStatus};
use footfall_core::visit::Visit;

use crate::error::AppError;
use crate::models::CurrentManager;
use crate::store::VisitStore;

/// Result of a manual status change.
#[derive(Debug, Clone)]
pub struct ManualOutcome {
    /// The visit as stored after the attempt.
    pub visit: Visit,
    /// Whether this call's write landed. `false` means another writer
    /// (sweep or a second manager action) resolved the visit first; the
    /// snapshot shows the winning state.
    pub applied: bool,
}

/// Applies manager-initiated status changes to visits.
pub struct LifecycleService {
    store: Arc<dyn VisitStore>,
    grace: chrono::Duration,
}

impl LifecycleService {
    /// Create a new lifecycle service.
    #[must_use]
    pub fn new(store: Arc<dyn VisitStore>, grace: chrono::Duration) -> Self {
        Self { store, grace }
    }

    /// Move a visit to `target` on behalf of `manager`.
    ///
    /// The capability check (caller manages the owning store) runs once,
    /// before the state machine. Validation happens against the freshly
    /// read snapshot, so the caller gets a precise `InvalidTransition`
    /// rather than a silent no-op when the visit is already terminal. If
    /// the conditional write then loses a race, the first successful
    /// write is authoritative and the outcome reports the winning state
    /// with `applied: false`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown visit, `Forbidden` for a foreign store,
    /// `BadRequest` for a `SCHEDULED` target, `InvalidTransition` when
    /// the state machine rejects the change, `Database` on storage
    /// failure.
    #[instrument(skip(self, manager), fields(manager_id = %manager.id))]
    pub async fn set_status(
        &self,
        manager: &CurrentManager,
        id: VisitId,
        target: VisitStatus,
        now: DateTime<Utc>,
    ) -> Result<ManualOutcome, AppError> {
        let visit = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("visit {id}")))?;

        // Single capability check before any state machine work.
        if manager.store_id != visit.store_id {
            return Err(AppError::Forbidden(
                "visit belongs to another store".to_string(),
            ));
        }

        let applied = match target {
            VisitStatus::Scheduled => {
                return Err(AppError::BadRequest(
                    "target status must be COMPLETED, MISSED, or CANCELLED".to_string(),
                ));
            }
            VisitStatus::Completed => {
                visit.clone().complete(now)?;
                self.store.complete(id, now).await?
            }
            VisitStatus::Cancelled => {
                visit.clone().cancel()?;
                self.store.cancel(id, now).await?
            }
            VisitStatus::Missed => {
                visit.clone().mark_missed(now, self.grace)?;
                self.store.mark_missed(id, now, self.grace).await?
            }
        };

        if applied {
            info!(visit_id = %id, status = %target, "Visit status updated");
        } else {
            info!(visit_id = %id, status = %target, "Conditional write lost the race; reporting winning state");
        }

        // Re-read so the response always reflects what actually landed.
        let current = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("visit {id}")))?;

        Ok(ManualOutcome {
            visit: current,
            applied,
        })
    }

    /// Fetch a visit, enforcing store ownership.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown visit, `Forbidden` for a foreign store,
    /// `Database` on storage failure.
    pub async fn get_visit(
        &self,
        manager: &CurrentManager,
        id: VisitId,
    ) -> Result<Visit, AppError> {
        let visit = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("visit {id}")))?;

        if manager.store_id != visit.store_id {
            return Err(AppError::Forbidden(
                "visit belongs to another store".to_string(),
            ));
        }

        Ok(visit)
    }
}
