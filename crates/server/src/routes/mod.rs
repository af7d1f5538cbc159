//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                  - Liveness check
//! GET  /health/ready            - Readiness check (verifies database)
//!
//! # Scheduled trigger (bearer credential)
//! GET  /internal/reminders/run  - Run one sweep/select/dispatch cycle
//!
//! # Visits (manager session required)
//! GET  /visits/{id}             - Visit detail
//! POST /visits/{id}/status      - Manually complete/miss/cancel a visit
//! ```

pub mod reminders;
pub mod visits;

use axum::Router;

use crate::state::AppState;

/// All application routes (health endpoints are wired in `main`).
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(reminders::router())
        .merge(visits::router())
}
