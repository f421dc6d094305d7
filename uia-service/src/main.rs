use std::net::SocketAddr;
use std::sync::Arc;

use service_core::error::AppError;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::init_tracing;
use tokio::signal;
use uia_service::{
    build_router,
    config::UiaConfig,
    services::{
        CheckerRegistry, DummyChecker, InMemorySessionStore, RecaptchaChecker,
        RegistrationService, SessionStore, TermsChecker, UiaService,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = UiaConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting user-interactive auth service"
    );

    let ttl = chrono::Duration::seconds(config.session.ttl_seconds as i64);
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(ttl));

    let mut registry = CheckerRegistry::new();
    registry.register(Arc::new(DummyChecker));
    if config.registration.require_captcha {
        let checker = RecaptchaChecker::new(&config.recaptcha).map_err(AppError::ConfigError)?;
        registry.register(Arc::new(checker));
    }
    if config.registration.require_terms {
        registry.register(Arc::new(TermsChecker::new(&config.terms)));
    }

    let uia = Arc::new(UiaService::new(store.clone(), Arc::new(registry)));
    let registration = Arc::new(RegistrationService::new(config.server_name.clone()));
    let registration_flows = config.registration_flows();
    tracing::info!(flows = ?registration_flows, "Registration auth flows");

    let register_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.register_attempts,
        config.rate_limit.register_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );

    // Background sweep so abandoned sessions do not pile up.
    let purge_store = store.clone();
    let purge_interval = std::time::Duration::from_secs(config.session.purge_interval_seconds);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_interval);
        // The first tick completes immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = purge_store.purge_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Purged expired auth sessions");
            }
        }
    });

    let state = AppState {
        config: config.clone(),
        uia,
        registration,
        registration_flows,
        session_store: store,
        register_rate_limiter,
        ip_rate_limiter,
    };

    let app = build_router(state).await?;

    let addr = config.common.socket_addr();
    tracing::info!(address = %addr, "uia-service listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down gracefully");
        },
    }
}
