//! Services layer for uia-service.
//!
//! Holds the auth coordinator, the stage checker registry, session
//! persistence, and the registration operation it all guards.

pub mod checker;
pub mod error;
pub mod registration;
pub mod session_store;
pub mod uia;

pub use checker::{
    CheckerFailure, CheckerRegistry, DummyChecker, RecaptchaChecker, StageChecker, TermsChecker,
};
pub use error::ServiceError;
pub use registration::{REGISTERED_USER_SESSION_KEY, RegistrationService};
pub use session_store::{InMemorySessionStore, SessionStore, SessionStoreError};
pub use uia::{StageAttempt, UiaAuthorization, UiaOutcome, UiaService};
