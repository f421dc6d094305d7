pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;

use axum::{
    Json, Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use service_core::middleware::{
    rate_limit::ip_rate_limit_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::UiaConfig;
use crate::models::AuthFlow;
use crate::services::{RegistrationService, SessionStore, UiaService};
use service_core::error::AppError;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::register::register,
        handlers::fallback::fallback_page,
        handlers::fallback::fallback_submit,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::register::RegisterParams,
            dtos::register::RegisterResponse,
            dtos::uia::UiaChallenge,
        )
    ),
    tags(
        (name = "Registration", description = "Account registration guarded by user-interactive auth"),
        (name = "Fallback", description = "Browser fallback pages for auth stages"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: UiaConfig,
    pub uia: Arc<UiaService>,
    pub registration: Arc<RegistrationService>,
    /// Flow table guarding the registration operation.
    pub registration_flows: Vec<AuthFlow>,
    pub session_store: Arc<dyn SessionStore>,
    pub register_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
    pub ip_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Registration gets its own tighter limit on top of the global one.
    let register_limiter = state.register_rate_limiter.clone();
    let register_route = Router::new()
        .route("/register", post(handlers::register::register))
        .layer(from_fn_with_state(
            register_limiter,
            ip_rate_limit_middleware,
        ));

    let fallback_routes = Router::new().route(
        "/auth/:stage/fallback/web",
        get(handlers::fallback::fallback_page).post(handlers::fallback::fallback_submit),
    );

    // Create global IP rate limiter
    let ip_limiter = state.ip_rate_limiter.clone();

    let mut app = Router::new().route("/health", get(health_check));

    // Only add Swagger UI if enabled in config
    let swagger_enabled = match state.config.environment {
        config::Environment::Dev => true,
        config::Environment::Prod => match state.config.swagger.enabled {
            config::SwaggerMode::Public | config::SwaggerMode::Authenticated => true,
            config::SwaggerMode::Disabled => false,
        },
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // If Swagger UI is disabled, still provide the OpenAPI JSON for programmatic access
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .merge(register_route)
        .merge(fallback_routes)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Add CORS layer
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<axum::http::HeaderValue>().unwrap_or_else(|e| {
                                tracing::error!(
                                    "Invalid CORS origin '{}': {}. Using fallback.",
                                    o,
                                    e
                                );
                                axum::http::HeaderValue::from_static("*")
                            })
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let active_sessions = state.session_store.session_count().await;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "active_sessions": active_sessions,
    })))
}
