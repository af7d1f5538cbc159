//! Authentication extractors for manager-facing endpoints.
//!
//! Login happens in the external accounts service; by the time a request
//! reaches us, an authenticated manager has a `CurrentManager` identity
//! in the shared session store. These extractors only read it.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use crate::models::{CurrentManager, session_keys};

/// Extractor that requires a logged-in store manager.
///
/// This is an API service, so an unauthenticated request always gets a
/// plain 401 rather than a login redirect.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireManagerAuth(manager): RequireManagerAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", manager.name)
/// }
/// ```
pub struct RequireManagerAuth(pub CurrentManager);

/// Error returned when manager authentication is required but missing.
pub struct ManagerAuthRejection;

impl IntoResponse for ManagerAuthRejection {
    fn into_response(self) -> Response {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

impl<S> FromRequestParts<S> for RequireManagerAuth
where
    S: Send + Sync,
{
    type Rejection = ManagerAuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(ManagerAuthRejection)?;

        // Get the current manager from the session
        let manager: CurrentManager = session
            .get(session_keys::CURRENT_MANAGER)
            .await
            .ok()
            .flatten()
            .ok_or(ManagerAuthRejection)?;

        Ok(Self(manager))
    }
}
