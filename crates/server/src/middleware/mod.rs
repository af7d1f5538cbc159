//! HTTP middleware: session layer and authentication extractors.

pub mod auth;
pub mod session;

pub use auth::RequireManagerAuth;
pub use session::create_session_layer;
