//! The registration operation guarded by user-interactive auth.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::{Rng, distributions::Alphanumeric};

use crate::models::RegisteredUser;
use crate::services::ServiceError;

/// Session-data key under which a finished registration memoizes its user
/// id, so re-polling a completed session never creates a second account.
pub const REGISTERED_USER_SESSION_KEY: &str = "registered_user_id";

const ACCESS_TOKEN_LEN: usize = 32;

/// Characters allowed in a localpart.
fn is_localpart_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '=' | '-' | '/')
}

/// In-memory user directory backing the registration operation.
pub struct RegistrationService {
    server_name: String,
    users: DashMap<String, RegisteredUser>,
}

impl RegistrationService {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            users: DashMap::new(),
        }
    }

    /// Fully qualified user id for a localpart.
    pub fn user_id(&self, localpart: &str) -> String {
        format!("@{localpart}:{}", self.server_name)
    }

    /// Claim `localpart`, failing when it is taken or malformed. The entry
    /// lock makes the uniqueness check and the insert one atomic step.
    pub fn register(&self, localpart: &str) -> Result<RegisteredUser, ServiceError> {
        if !localpart.chars().all(is_localpart_char) {
            return Err(ServiceError::InvalidUsername(
                "only lowercase ASCII letters, digits and ._=-/ are allowed".into(),
            ));
        }

        let user = RegisteredUser {
            user_id: self.user_id(localpart),
            localpart: localpart.to_string(),
            created_at: Utc::now(),
        };

        match self.users.entry(localpart.to_string()) {
            Entry::Occupied(_) => Err(ServiceError::UserInUse),
            Entry::Vacant(vacant) => {
                tracing::info!(user = %user.user_id, "Registered user");
                vacant.insert(user.clone());
                Ok(user)
            }
        }
    }

    pub fn is_registered(&self, localpart: &str) -> bool {
        self.users.contains_key(localpart)
    }

    /// Mint an opaque bearer token for a fresh login. Tokens are not
    /// persisted; this service only demonstrates the guarded operation.
    pub fn mint_access_token(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ACCESS_TOKEN_LEN)
            .map(char::from)
            .collect()
    }
}
