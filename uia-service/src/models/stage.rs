//! Stage type identifiers for user-interactive auth.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Identifier of one verification method inside an auth flow.
///
/// The set of stage types is open: deployments may advertise identifiers
/// the core has never heard of, as long as a checker is registered for
/// them at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageType(String);

impl StageType {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageType {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for StageType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// Lets maps keyed by StageType be queried with a plain &str.
impl Borrow<str> for StageType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Well-known stage identifiers.
pub mod well_known {
    pub const PASSWORD: &str = "m.login.password";
    pub const RECAPTCHA: &str = "m.login.recaptcha";
    pub const DUMMY: &str = "m.login.dummy";
    pub const TERMS: &str = "m.login.terms";
    pub const EMAIL_IDENTITY: &str = "m.login.email.identity";
    pub const MSISDN: &str = "m.login.msisdn";
}
