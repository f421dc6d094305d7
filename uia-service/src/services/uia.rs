//! Coordinator for the per-session auth protocol.
//!
//! Every protected operation funnels its request body through [`UiaService::evaluate`],
//! which owns session resolution, the parameter-snapshot comparison, stage
//! verification, and the satisfied/challenge decision. The browser fallback
//! path reuses the same stage machinery through
//! [`UiaService::complete_out_of_band`] without ever evaluating flows.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use crate::dtos::uia::UiaChallenge;
use crate::models::{AuthFlow, AuthSession, StageType, any_flow_satisfied};
use crate::services::ServiceError;
use crate::services::checker::CheckerRegistry;
use crate::services::session_store::SessionStore;

/// Key naming the auth container inside a protected request body.
const AUTH_KEY: &str = "auth";
/// Key naming the session id inside the auth container.
const SESSION_KEY: &str = "session";
/// Key naming the submitted stage type inside the auth container.
const TYPE_KEY: &str = "type";

/// Proof that some flow was fully satisfied; carried to the operation
/// handler so it can finally run.
#[derive(Debug)]
pub struct UiaAuthorization {
    pub session_id: String,
    /// The parameter snapshot taken when the session was created. Handlers
    /// execute the operation against this, not the latest request body.
    pub operation_params: Map<String, Value>,
    /// Stage-specific results accumulated across the session.
    pub stage_results: HashMap<StageType, Value>,
}

/// Outcome of one [`UiaService::evaluate`] round trip.
#[derive(Debug)]
pub enum UiaOutcome {
    /// Some flow is fully satisfied; the protected operation may proceed.
    Complete(UiaAuthorization),
    /// More stages are required; answer with this challenge and status 401.
    Incomplete(UiaChallenge),
}

/// Result of one stage verification attempt. A rejection is a normal
/// protocol event, not an error.
#[derive(Debug)]
pub enum StageAttempt {
    Passed,
    Rejected(String),
}

pub struct UiaService {
    store: Arc<dyn SessionStore>,
    registry: Arc<CheckerRegistry>,
}

impl UiaService {
    pub fn new(store: Arc<dyn SessionStore>, registry: Arc<CheckerRegistry>) -> Self {
        Self { store, registry }
    }

    /// Run one round of user-interactive auth for a protected request.
    ///
    /// `body` is the operation's full JSON body, auth container included.
    /// A body without a session id starts a fresh session; a body naming a
    /// stage type has that stage verified in the same call.
    pub async fn evaluate(
        &self,
        flows: &[AuthFlow],
        body: &Map<String, Value>,
        remote_ip: IpAddr,
    ) -> Result<UiaOutcome, ServiceError> {
        let auth = body.get(AUTH_KEY).and_then(Value::as_object);
        let operation_params = strip_auth(body);

        let session = match auth
            .and_then(|dict| dict.get(SESSION_KEY))
            .and_then(Value::as_str)
        {
            Some(session_id) => {
                let session = self
                    .store
                    .get(session_id)
                    .await?
                    .ok_or(ServiceError::InvalidSession)?;

                // The operation is fingerprinted by its first request. Any
                // later divergence voids the session's progress for this
                // call, even a fully completed one.
                if let Some(param) = session.conflicting_param(&operation_params) {
                    tracing::info!(
                        session = %session.id,
                        param = %param,
                        "Operation parameters changed during auth session"
                    );
                    return Err(ServiceError::OperationMismatch);
                }
                session
            }
            None => {
                let session = self.store.create(operation_params).await?;
                tracing::debug!(session = %session.id, "Created auth session");
                session
            }
        };

        let mut error = None;
        let mut checked = false;
        if let Some(authdict) = auth {
            if let Some(stage) = authdict.get(TYPE_KEY).and_then(Value::as_str) {
                let stage = StageType::from(stage);
                match self
                    .check_stage(&session.id, &stage, authdict, remote_ip)
                    .await?
                {
                    StageAttempt::Passed => checked = true,
                    StageAttempt::Rejected(reason) => error = Some(reason),
                }
            }
        }

        // A passed check mutated the stored record; re-read for the
        // canonical completion set.
        let session = if checked {
            self.store
                .get(&session.id)
                .await?
                .ok_or(ServiceError::InvalidSession)?
        } else {
            session
        };

        if any_flow_satisfied(flows, &session.completed) {
            tracing::info!(session = %session.id, "Auth requirements satisfied");
            return Ok(UiaOutcome::Complete(UiaAuthorization {
                session_id: session.id,
                operation_params: session.params,
                stage_results: session.completed,
            }));
        }

        tracing::debug!(
            session = %session.id,
            completed = session.completed.len(),
            "Auth incomplete, issuing challenge"
        );
        Ok(UiaOutcome::Incomplete(self.challenge(session, flows, error)))
    }

    /// Complete a single stage outside the main API, on behalf of the
    /// fallback web pages. Flows are never evaluated here and no operation
    /// state is exposed; the client finds out by re-polling the operation.
    pub async fn complete_out_of_band(
        &self,
        stage: &StageType,
        session_id: &str,
        submission: &Map<String, Value>,
        remote_ip: IpAddr,
    ) -> Result<StageAttempt, ServiceError> {
        self.ensure_session(session_id).await?;
        self.check_stage(session_id, stage, submission, remote_ip)
            .await
    }

    /// Whether a checker is registered for `stage`.
    pub fn knows_stage(&self, stage: &StageType) -> bool {
        self.registry.get(stage).is_some()
    }

    /// Confirm a session is live before running a checker on its behalf.
    async fn ensure_session(&self, session_id: &str) -> Result<(), ServiceError> {
        match self.store.get(session_id).await? {
            Some(_) => Ok(()),
            None => Err(ServiceError::InvalidSession),
        }
    }

    /// Server-private session data, used by operations to memoize their
    /// side effects across re-polls.
    pub async fn session_data(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Option<Value>, ServiceError> {
        Ok(self.store.get_data(session_id, key).await?)
    }

    pub async fn set_session_data(
        &self,
        session_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), ServiceError> {
        Ok(self.store.set_data(session_id, key, value).await?)
    }

    /// Resolve and run the checker for `stage`, recording the result on
    /// success. Both the main API and the fallback path funnel through
    /// here.
    async fn check_stage(
        &self,
        session_id: &str,
        stage: &StageType,
        submission: &Map<String, Value>,
        remote_ip: IpAddr,
    ) -> Result<StageAttempt, ServiceError> {
        let checker = self
            .registry
            .get(stage)
            .ok_or_else(|| ServiceError::UnknownStage(stage.clone()))?;

        match checker.check(submission, remote_ip).await {
            Ok(result) => {
                self.store
                    .complete_stage(session_id, stage.clone(), result)
                    .await?;
                tracing::info!(session = %session_id, stage = %stage, "Auth stage completed");
                Ok(StageAttempt::Passed)
            }
            Err(failure) => {
                tracing::info!(
                    session = %session_id,
                    stage = %stage,
                    error = %failure,
                    "Auth stage rejected"
                );
                Ok(StageAttempt::Rejected(failure.to_string()))
            }
        }
    }

    /// Build the challenge payload for an unfinished session.
    fn challenge(
        &self,
        session: AuthSession,
        flows: &[AuthFlow],
        error: Option<String>,
    ) -> UiaChallenge {
        let params = self
            .registry
            .public_params(flows.iter().flat_map(|flow| flow.stages.iter()));
        let completed = session.completed_stages();

        UiaChallenge {
            session_id: session.id,
            flows: flows.to_vec(),
            params,
            completed,
            error,
        }
    }
}

/// The operation's own parameters: everything except the auth container
/// and any stray top-level session key.
fn strip_auth(body: &Map<String, Value>) -> Map<String, Value> {
    body.iter()
        .filter(|(key, _)| key.as_str() != AUTH_KEY && key.as_str() != SESSION_KEY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stage::well_known;
    use crate::services::checker::{CheckerFailure, DummyChecker, StageChecker};
    use crate::services::session_store::InMemorySessionStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;
    use std::net::Ipv4Addr;

    struct RejectingPasswordChecker;

    #[async_trait]
    impl StageChecker for RejectingPasswordChecker {
        fn stage_type(&self) -> StageType {
            well_known::PASSWORD.into()
        }

        async fn check(
            &self,
            _submission: &Map<String, Value>,
            _remote_ip: IpAddr,
        ) -> Result<Value, CheckerFailure> {
            Err(CheckerFailure("Invalid password".into()))
        }
    }

    fn service() -> UiaService {
        let store = Arc::new(InMemorySessionStore::new(Duration::seconds(1800)));
        let mut registry = CheckerRegistry::new();
        registry.register(Arc::new(DummyChecker));
        registry.register(Arc::new(RejectingPasswordChecker));
        UiaService::new(store, Arc::new(registry))
    }

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().expect("test body must be an object").clone()
    }

    fn dummy_flows() -> Vec<AuthFlow> {
        vec![AuthFlow::new([well_known::DUMMY])]
    }

    #[test]
    fn strip_auth_removes_protocol_keys_only() {
        let stripped = strip_auth(&body(json!({
            "username": "alice",
            "auth": {"type": "m.login.dummy"},
            "session": "stray",
        })));

        assert_eq!(stripped.len(), 1);
        assert_eq!(stripped["username"], json!("alice"));
    }

    #[tokio::test]
    async fn bare_request_yields_challenge_with_new_session() {
        let uia = service();
        let outcome = uia
            .evaluate(&dummy_flows(), &body(json!({"username": "alice"})), ip())
            .await
            .unwrap();

        match outcome {
            UiaOutcome::Incomplete(challenge) => {
                assert!(!challenge.session_id.is_empty());
                assert!(challenge.completed.is_empty());
                assert!(challenge.error.is_none());
                assert_eq!(challenge.flows, dummy_flows());
            }
            UiaOutcome::Complete(_) => panic!("expected a challenge"),
        }
    }

    #[tokio::test]
    async fn stage_submission_without_session_creates_and_completes() {
        let uia = service();
        let outcome = uia
            .evaluate(
                &dummy_flows(),
                &body(json!({
                    "username": "alice",
                    "auth": {"type": "m.login.dummy"},
                })),
                ip(),
            )
            .await
            .unwrap();

        match outcome {
            UiaOutcome::Complete(authz) => {
                assert_eq!(authz.operation_params["username"], json!("alice"));
                assert!(authz.stage_results.contains_key(well_known::DUMMY));
            }
            UiaOutcome::Incomplete(_) => panic!("dummy flow should complete in one call"),
        }
    }

    #[tokio::test]
    async fn changed_parameters_are_rejected() {
        let uia = service();
        let first = uia
            .evaluate(
                &dummy_flows(),
                &body(json!({"username": "alice", "password": "bar"})),
                ip(),
            )
            .await
            .unwrap();
        let session_id = match first {
            UiaOutcome::Incomplete(challenge) => challenge.session_id,
            UiaOutcome::Complete(_) => panic!("expected a challenge"),
        };

        let err = uia
            .evaluate(
                &dummy_flows(),
                &body(json!({
                    "username": "alice",
                    "password": "foo",
                    "auth": {"type": "m.login.dummy", "session": session_id},
                })),
                ip(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::OperationMismatch));
    }

    #[tokio::test]
    async fn rejected_stage_surfaces_error_in_challenge() {
        let uia = service();
        let flows = vec![AuthFlow::new([well_known::PASSWORD])];

        let outcome = uia
            .evaluate(
                &flows,
                &body(json!({
                    "username": "alice",
                    "auth": {"type": "m.login.password", "password": "wrong"},
                })),
                ip(),
            )
            .await
            .unwrap();

        match outcome {
            UiaOutcome::Incomplete(challenge) => {
                assert_eq!(challenge.error.as_deref(), Some("Invalid password"));
                assert!(challenge.completed.is_empty());
            }
            UiaOutcome::Complete(_) => panic!("rejected stage must not complete"),
        }
    }

    #[tokio::test]
    async fn unknown_stage_type_is_an_error() {
        let uia = service();
        let err = uia
            .evaluate(
                &dummy_flows(),
                &body(json!({"auth": {"type": "m.login.sso"}})),
                ip(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::UnknownStage(_)));
    }

    #[tokio::test]
    async fn unknown_session_id_is_invalid() {
        let uia = service();
        let err = uia
            .evaluate(
                &dummy_flows(),
                &body(json!({"auth": {"session": "does-not-exist"}})),
                ip(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidSession));
    }

    #[tokio::test]
    async fn out_of_band_completion_feeds_later_polls() {
        let uia = service();
        let flows = dummy_flows();

        let challenge = match uia
            .evaluate(&flows, &body(json!({"username": "alice"})), ip())
            .await
            .unwrap()
        {
            UiaOutcome::Incomplete(challenge) => challenge,
            UiaOutcome::Complete(_) => panic!("expected a challenge"),
        };

        let attempt = uia
            .complete_out_of_band(
                &well_known::DUMMY.into(),
                &challenge.session_id,
                &Map::new(),
                ip(),
            )
            .await
            .unwrap();
        assert!(matches!(attempt, StageAttempt::Passed));

        let outcome = uia
            .evaluate(
                &flows,
                &body(json!({
                    "username": "alice",
                    "auth": {"session": challenge.session_id},
                })),
                ip(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, UiaOutcome::Complete(_)));
    }
}
