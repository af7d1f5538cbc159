//! Scheduled trigger endpoint.
//!
//! An external periodic trigger (cron-like) calls this once per interval;
//! the service holds no timer of its own. The handler authenticates the
//! caller, runs one reminder cycle, and reports the aggregate outcome.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::instrument;

use crate::error::AppError;
use crate::services::CycleOutcome;
use crate::state::AppState;

/// Create trigger routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/internal/reminders/run", get(run_cycle))
}

/// Run one reminder cycle: sweep, select, dispatch.
///
/// Requires `Authorization: Bearer <REMINDER_TRIGGER_SECRET>`. Responds
/// 401 on mismatch and 200 with the cycle summary otherwise; a phase that
/// aborted is reported inside the summary's `error` field rather than as
/// a failed request, so the caller always sees the partial counts.
#[instrument(skip(state, headers))]
async fn run_cycle(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer credential".to_string()))?;

    let expected = state.config().reminders.trigger_secret.expose_secret();
    if !constant_time_compare(provided, expected) {
        return Err(AppError::Unauthorized("invalid trigger credential".to_string()));
    }

    let now = Utc::now();
    let outcome: CycleOutcome = state.engine().run_cycle(now).await;

    Ok(Json(outcome))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("trigger-cred", "trigger-cred"));
        assert!(constant_time_compare("", ""));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("trigger-cred", "trigger-crec"));
        assert!(!constant_time_compare("abc", "abd"));
    }

    #[test]
    fn test_constant_time_compare_different_lengths() {
        assert!(!constant_time_compare("short", "longer-credential"));
        assert!(!constant_time_compare("x", ""));
    }
}
