//! Registered-user record backing the registration operation.

use chrono::{DateTime, Utc};

/// An account created through the registration endpoint.
#[derive(Debug, Clone)]
pub struct RegisteredUser {
    /// Fully qualified id, `@localpart:server_name`.
    pub user_id: String,
    pub localpart: String,
    pub created_at: DateTime<Utc>,
}
