//! Stage checkers: the pluggable verification capabilities behind each
//! advertised stage type.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{RecaptchaConfig, TermsConfig};
use crate::models::StageType;
use crate::models::stage::well_known;

/// A rejected or failed verification attempt. Checker failures are never
/// fatal to the session; the coordinator folds them into the next
/// challenge.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct CheckerFailure(pub String);

/// One verification capability.
///
/// Implementations may do remote I/O but must fail soft: any problem,
/// including backend outages, is reported as a `CheckerFailure`.
#[async_trait]
pub trait StageChecker: Send + Sync {
    /// The stage identifier this checker serves.
    fn stage_type(&self) -> StageType;

    /// Public metadata advertised to clients in challenges.
    fn params(&self) -> Option<Value> {
        None
    }

    /// Verify one submission for this stage. `submission` is the client's
    /// auth dict (main API) or the collected form fields (fallback web).
    async fn check(
        &self,
        submission: &Map<String, Value>,
        remote_ip: IpAddr,
    ) -> Result<Value, CheckerFailure>;
}

/// Stage type to checker map, populated once at startup.
#[derive(Default)]
pub struct CheckerRegistry {
    checkers: HashMap<StageType, Arc<dyn StageChecker>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a checker under its own stage type. Re-registering a stage
    /// replaces the previous checker.
    pub fn register(&mut self, checker: Arc<dyn StageChecker>) {
        let stage = checker.stage_type();
        tracing::debug!(stage = %stage, "Registered auth stage checker");
        self.checkers.insert(stage, checker);
    }

    pub fn get(&self, stage: &StageType) -> Option<Arc<dyn StageChecker>> {
        self.checkers.get(stage).cloned()
    }

    /// Public parameters for every registered stage among `stages`,
    /// keyed by stage identifier. Stages without metadata are omitted.
    pub fn public_params<'a, I>(&self, stages: I) -> Map<String, Value>
    where
        I: IntoIterator<Item = &'a StageType>,
    {
        let mut params = Map::new();
        for stage in stages {
            if let Some(checker) = self.checkers.get(stage) {
                if let Some(value) = checker.params() {
                    params.insert(stage.as_str().to_string(), value);
                }
            }
        }
        params
    }
}

/// Unconditionally successful stage, used to terminate flows that need no
/// real verification.
pub struct DummyChecker;

#[async_trait]
impl StageChecker for DummyChecker {
    fn stage_type(&self) -> StageType {
        well_known::DUMMY.into()
    }

    async fn check(
        &self,
        _submission: &Map<String, Value>,
        _remote_ip: IpAddr,
    ) -> Result<Value, CheckerFailure> {
        Ok(Value::Bool(true))
    }
}

/// Terms-of-service acceptance. Submitting the stage at all records
/// agreement; the policy documents are advertised through `params`.
pub struct TermsChecker {
    policies: Value,
}

impl TermsChecker {
    pub fn new(config: &TermsConfig) -> Self {
        let mut document = Map::new();
        document.insert("version".into(), json!(config.policy_version));
        document.insert(
            "en".into(),
            json!({
                "name": config.policy_name,
                "url": config.policy_url,
            }),
        );

        let mut policies = Map::new();
        policies.insert("privacy_policy".into(), Value::Object(document));

        Self {
            policies: json!({ "policies": Value::Object(policies) }),
        }
    }
}

#[async_trait]
impl StageChecker for TermsChecker {
    fn stage_type(&self) -> StageType {
        well_known::TERMS.into()
    }

    fn params(&self) -> Option<Value> {
        Some(self.policies.clone())
    }

    async fn check(
        &self,
        _submission: &Map<String, Value>,
        _remote_ip: IpAddr,
    ) -> Result<Value, CheckerFailure> {
        Ok(Value::Bool(true))
    }
}

/// Google reCAPTCHA verification against the siteverify endpoint.
pub struct RecaptchaChecker {
    http: reqwest::Client,
    public_key: String,
    private_key: String,
    siteverify_url: String,
}

impl RecaptchaChecker {
    pub fn new(config: &RecaptchaConfig) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            public_key: config.public_key.clone(),
            private_key: config.private_key.clone(),
            siteverify_url: config.siteverify_url.clone(),
        })
    }

    /// Captcha responses arrive as `response` on the main API and as
    /// `g-recaptcha-response` from the widget on the fallback page.
    fn captcha_response(submission: &Map<String, Value>) -> Option<&str> {
        submission
            .get("response")
            .or_else(|| submission.get("g-recaptcha-response"))
            .and_then(Value::as_str)
    }
}

#[async_trait]
impl StageChecker for RecaptchaChecker {
    fn stage_type(&self) -> StageType {
        well_known::RECAPTCHA.into()
    }

    fn params(&self) -> Option<Value> {
        Some(json!({ "public_key": self.public_key }))
    }

    async fn check(
        &self,
        submission: &Map<String, Value>,
        remote_ip: IpAddr,
    ) -> Result<Value, CheckerFailure> {
        let response = Self::captcha_response(submission)
            .ok_or_else(|| CheckerFailure("Captcha response is required".into()))?;

        let remote_ip = remote_ip.to_string();
        let form = [
            ("secret", self.private_key.as_str()),
            ("response", response),
            ("remoteip", remote_ip.as_str()),
        ];

        let verdict: Value = self
            .http
            .post(&self.siteverify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Captcha siteverify request failed");
                CheckerFailure("Captcha verification is unavailable".into())
            })?
            .json()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Captcha siteverify returned malformed body");
                CheckerFailure("Captcha verification is unavailable".into())
            })?;

        if verdict_accepts(&verdict) {
            Ok(Value::Bool(true))
        } else {
            tracing::info!(
                error_codes = ?verdict.get("error-codes"),
                "Captcha verification rejected"
            );
            Err(CheckerFailure("Captcha verification failed".into()))
        }
    }
}

/// A siteverify verdict counts only when `success` is literally true.
fn verdict_accepts(verdict: &Value) -> bool {
    verdict
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
