//! Manager-facing visit endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use footfall_core::types::{VisitId, VisitStatus};
use footfall_core::visit::Visit;

use crate::error::AppError;
use crate::middleware::RequireManagerAuth;
use crate::state::AppState;

/// Create visit routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/visits/{id}", get(show))
        .route("/visits/{id}/status", post(set_status))
}

/// Request body for a manual status change.
#[derive(Debug, Deserialize)]
struct SetStatusRequest {
    /// Target status; `SCHEDULED` is not a valid target.
    status: String,
}

/// Response for visit reads and status changes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VisitResponse {
    #[serde(flatten)]
    visit: Visit,
    /// Present on status changes: whether this call's write landed, or a
    /// concurrent writer resolved the visit first.
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<bool>,
}

/// Fetch a visit belonging to the caller's store.
#[instrument(skip_all, fields(visit_id = %id))]
async fn show(
    State(state): State<AppState>,
    RequireManagerAuth(manager): RequireManagerAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let visit = state
        .lifecycle()
        .get_visit(&manager, VisitId::new(id))
        .await?;

    Ok(Json(VisitResponse {
        visit,
        applied: None,
    }))
}

/// Manually move a visit to `COMPLETED`, `MISSED`, or `CANCELLED`.
///
/// Any other status string is rejected with a validation error. The
/// caller must manage the visit's store. If a concurrent writer (the
/// sweep, or another manager action) resolved the visit between our read
/// and write, the response carries the winning state with
/// `applied: false`.
#[instrument(skip_all, fields(visit_id = %id))]
async fn set_status(
    State(state): State<AppState>,
    RequireManagerAuth(manager): RequireManagerAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<SetStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target: VisitStatus = body.status.parse().map_err(|_| {
        AppError::BadRequest(format!(
            "invalid status {:?}: expected COMPLETED, MISSED, or CANCELLED",
            body.status
        ))
    })?;

    let now = Utc::now();
    let outcome = state
        .lifecycle()
        .set_status(&manager, VisitId::new(id), target, now)
        .await?;

    Ok(Json(VisitResponse {
        visit: outcome.visit,
        applied: Some(outcome.applied),
    }))
}
