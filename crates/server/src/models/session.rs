//! Session-related types for store-manager authentication.
//!
//! The login flow itself lives in the accounts service; it writes this
//! identity into the shared session store, and this service only reads it.

use serde::{Deserialize, Serialize};

use footfall_core::{Email, ManagerId, StoreId};

/// Session-stored manager identity.
///
/// Minimal data needed to authorize manual visit actions: who the manager
/// is and which store they manage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentManager {
    /// Manager's database ID.
    pub id: ManagerId,
    /// Manager's email address.
    pub email: Email,
    /// Manager's display name.
    pub name: String,
    /// Store this manager is responsible for.
    pub store_id: StoreId,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in manager.
    pub const CURRENT_MANAGER: &str = "current_manager";
}
