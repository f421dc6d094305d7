//! Test helper module for uia-service integration tests.
//!
//! Builds the full router against in-memory state so tests can drive the
//! HTTP surface with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use serde_json::{Map, Value, json};
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use tower::util::ServiceExt;
use uia_service::{
    AppState, build_router,
    config::{
        Environment, RateLimitConfig, RecaptchaConfig, RegistrationConfig, SecurityConfig,
        SessionConfig, SwaggerConfig, SwaggerMode, TermsConfig, UiaConfig,
    },
    models::{AuthFlow, StageType, stage::well_known},
    services::{
        CheckerFailure, CheckerRegistry, DummyChecker, InMemorySessionStore, RegistrationService,
        SessionStore, StageChecker, TermsChecker, UiaService,
    },
};

pub const TEST_SERVER_NAME: &str = "test";
pub const TEST_RECAPTCHA_PUBLIC_KEY: &str = "brokencake";

/// Every submission a checker saw, with the client address it saw it from.
pub type RecordedAttempts = Arc<Mutex<Vec<(Map<String, Value>, IpAddr)>>>;

/// Captcha checker test double. Stands in for the real siteverify round
/// trip: records every submission and passes whenever a response field is
/// present at all.
pub struct RecordingRecaptchaChecker {
    attempts: RecordedAttempts,
}

impl RecordingRecaptchaChecker {
    pub fn new() -> (Arc<Self>, RecordedAttempts) {
        let attempts: RecordedAttempts = Arc::new(Mutex::new(Vec::new()));
        let checker = Arc::new(Self {
            attempts: attempts.clone(),
        });
        (checker, attempts)
    }
}

#[async_trait]
impl StageChecker for RecordingRecaptchaChecker {
    fn stage_type(&self) -> StageType {
        well_known::RECAPTCHA.into()
    }

    fn params(&self) -> Option<Value> {
        Some(json!({ "public_key": TEST_RECAPTCHA_PUBLIC_KEY }))
    }

    async fn check(
        &self,
        submission: &Map<String, Value>,
        remote_ip: IpAddr,
    ) -> Result<Value, CheckerFailure> {
        self.attempts
            .lock()
            .unwrap()
            .push((submission.clone(), remote_ip));

        let response = submission
            .get("response")
            .or_else(|| submission.get("g-recaptcha-response"))
            .and_then(Value::as_str);
        match response {
            Some(_) => Ok(Value::Bool(true)),
            None => Err(CheckerFailure("Captcha response is required".into())),
        }
    }
}

/// Create a test configuration.
pub fn test_config(require_captcha: bool, require_terms: bool) -> UiaConfig {
    UiaConfig {
        common: service_core::config::Config {
            port: 0,
            host: "127.0.0.1".parse().unwrap(),
        },
        environment: Environment::Dev,
        service_name: "uia-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        server_name: TEST_SERVER_NAME.to_string(),
        otlp_endpoint: None,
        session: SessionConfig {
            ttl_seconds: 1800,
            purge_interval_seconds: 60,
        },
        registration: RegistrationConfig {
            require_captcha,
            require_terms,
        },
        recaptcha: RecaptchaConfig {
            public_key: TEST_RECAPTCHA_PUBLIC_KEY.to_string(),
            private_key: "test-secret".to_string(),
            siteverify_url: "https://www.recaptcha.net/recaptcha/api/siteverify".to_string(),
        },
        terms: TermsConfig {
            policy_name: "Privacy Policy".to_string(),
            policy_version: "1.0".to_string(),
            policy_url: "https://example.com/privacy".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            register_attempts: 100,
            register_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
    }
}

/// Test application exposing the built router plus handles into its state.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub recaptcha_attempts: RecordedAttempts,
}

impl TestApp {
    /// Spawn the application for `config` with its config-derived flows.
    pub async fn spawn(config: UiaConfig) -> Self {
        let flows = config.registration_flows();
        Self::spawn_with_flows(config, flows).await
    }

    /// Spawn with an explicit registration flow table. The recording
    /// captcha double stands in wherever captcha is enabled; stages with
    /// no registered checker may still appear in flows.
    pub async fn spawn_with_flows(config: UiaConfig, registration_flows: Vec<AuthFlow>) -> Self {
        let ttl = chrono::Duration::seconds(config.session.ttl_seconds as i64);
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(ttl));

        let (recaptcha, recaptcha_attempts) = RecordingRecaptchaChecker::new();
        let mut registry = CheckerRegistry::new();
        registry.register(Arc::new(DummyChecker));
        if config.registration.require_captcha {
            registry.register(recaptcha);
        }
        if config.registration.require_terms {
            registry.register(Arc::new(TermsChecker::new(&config.terms)));
        }

        let uia = Arc::new(UiaService::new(store.clone(), Arc::new(registry)));
        let registration = Arc::new(RegistrationService::new(config.server_name.clone()));

        let state = AppState {
            config: config.clone(),
            uia,
            registration,
            registration_flows,
            session_store: store,
            register_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.register_attempts,
                config.rate_limit.register_window_seconds,
            ),
            ip_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.global_ip_limit,
                config.rate_limit.global_ip_window_seconds,
            ),
        };

        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        TestApp {
            router,
            state,
            recaptcha_attempts,
        }
    }

    /// Spawn with the single-dummy-stage flow (no captcha, no terms).
    pub async fn spawn_dummy() -> Self {
        Self::spawn(test_config(false, false)).await
    }

    /// One-shot a request against a clone of the router.
    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    /// POST /register with a JSON body.
    pub async fn post_register(&self, body: Value) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri("/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request(request).await
    }

    /// GET the fallback page for `stage`.
    pub async fn get_fallback(&self, stage: &str, session: &str) -> Response<Body> {
        let request = Request::builder()
            .uri(format!("/auth/{stage}/fallback/web?session={session}"))
            .body(Body::empty())
            .unwrap();
        self.request(request).await
    }

    /// POST the fallback endpoint with all fields in the query string, the
    /// way the widget's noscript path and link-following clients do.
    pub async fn post_fallback_query(&self, stage: &str, query: &str) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/auth/{stage}/fallback/web?{query}"))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::empty())
            .unwrap();
        self.request(request).await
    }

    /// Open a fresh auth session by polling /register, returning the
    /// challenge's session id.
    pub async fn open_session(&self, operation: &Value) -> String {
        let response = self.post_register(operation.clone()).await;
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
        read_json(response).await["session"]
            .as_str()
            .expect("challenge names a session")
            .to_string()
    }
}

/// Read a response body as JSON.
pub async fn read_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Read a response body as text.
pub async fn read_html(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}
