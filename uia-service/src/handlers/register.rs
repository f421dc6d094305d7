use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use validator::Validate;

use service_core::error::AppError;

use crate::{
    AppState,
    dtos::{
        ErrorResponse,
        register::{RegisterParams, RegisterResponse},
        uia::UiaChallenge,
    },
    services::{REGISTERED_USER_SESSION_KEY, UiaAuthorization, UiaOutcome},
};

/// Register a new user, guarded by user-interactive auth
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterParams,
    responses(
        (status = 200, description = "Registration complete", body = RegisterResponse),
        (status = 401, description = "More auth stages required", body = UiaChallenge),
        (status = 400, description = "Invalid session, stage, or username", body = ErrorResponse),
        (status = 403, description = "Operation changed during the auth session", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Registration"
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Response, AppError> {
    let remote_ip = super::client_ip(&headers, connect_info.as_ref());

    // Auth runs before anything else, including the replay lookup below:
    // a divergent request body must fail even for a finished session.
    let authorization = match state
        .uia
        .evaluate(&state.registration_flows, &body, remote_ip)
        .await?
    {
        UiaOutcome::Complete(authorization) => authorization,
        UiaOutcome::Incomplete(challenge) => {
            return Ok((StatusCode::UNAUTHORIZED, Json(challenge)).into_response());
        }
    };

    // Re-polling a session that already registered replays the outcome
    // instead of creating a second account.
    if let Some(user_id) = state
        .uia
        .session_data(&authorization.session_id, REGISTERED_USER_SESSION_KEY)
        .await?
        .as_ref()
        .and_then(Value::as_str)
    {
        tracing::debug!(
            session = %authorization.session_id,
            user = %user_id,
            "Replaying completed registration"
        );
        return Ok(registration_success(&state, user_id.to_string()).into_response());
    }

    let user_id = perform_registration(&state, &authorization).await?;
    Ok(registration_success(&state, user_id).into_response())
}

/// Execute the now-authorized operation against the session's parameter
/// snapshot and memoize the result on the session.
async fn perform_registration(
    state: &AppState,
    authorization: &UiaAuthorization,
) -> Result<String, AppError> {
    let params: RegisterParams =
        serde_json::from_value(Value::Object(authorization.operation_params.clone()))
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed registration parameters: {e}")))?;
    params.validate()?;

    let username = params
        .username
        .as_deref()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing parameter: username")))?;

    let user = state.registration.register(username)?;
    state
        .uia
        .set_session_data(
            &authorization.session_id,
            REGISTERED_USER_SESSION_KEY,
            Value::String(user.user_id.clone()),
        )
        .await?;

    Ok(user.user_id)
}

fn registration_success(state: &AppState, user_id: String) -> (StatusCode, Json<RegisterResponse>) {
    (
        StatusCode::OK,
        Json(RegisterResponse {
            user_id,
            access_token: state.registration.mint_access_token(),
            home_server: state.config.server_name.clone(),
        }),
    )
}
