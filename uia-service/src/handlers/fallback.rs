//! Browser fallback pages for stages that need a real web UI.
//!
//! Clients without native support for a stage open
//! `/auth/{stage}/fallback/web?session=...` in a browser or webview. The
//! page walks the user through the stage and posts the result back to the
//! same URL; on success the page signals the opener and the client simply
//! re-polls the guarded operation.

use askama::Template;
use axum::{
    extract::{ConnectInfo, Path, Query, RawForm, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::SocketAddr;

use service_core::error::AppError;

use crate::{
    AppState,
    dtos::ErrorResponse,
    models::{StageType, stage::well_known},
    services::{ServiceError, StageAttempt},
};

#[derive(Template)]
#[template(path = "recaptcha.html")]
pub struct RecaptchaPage {
    pub session: String,
    pub sitekey: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "terms.html")]
pub struct TermsPage {
    pub session: String,
    pub policies: Vec<PolicyLink>,
    pub error: Option<String>,
}

pub struct PolicyLink {
    pub name: String,
    pub url: String,
}

#[derive(Template)]
#[template(path = "success.html")]
pub struct SuccessPage;

/// Render the fallback page for one stage
#[utoipa::path(
    get,
    path = "/auth/{stage}/fallback/web",
    params(
        ("stage" = String, Path, description = "Stage type, e.g. m.login.recaptcha"),
        ("session" = String, Query, description = "Auth session id"),
    ),
    responses(
        (status = 200, description = "Stage web page", content_type = "text/html"),
        (status = 400, description = "Missing session parameter or unrecognised stage type", body = ErrorResponse),
        (status = 404, description = "Stage has no web fallback", body = ErrorResponse)
    ),
    tag = "Fallback"
)]
pub async fn fallback_page(
    State(state): State<AppState>,
    Path(stage): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let stage = StageType::from(stage);
    let session = query
        .get("session")
        .cloned()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing parameter: session")))?;

    // Rendering is static: the session id is only embedded in the form and
    // validated when the stage is submitted.
    render_stage_page(&state, &stage, session, None)
}

/// Submit a completed fallback stage
#[utoipa::path(
    post,
    path = "/auth/{stage}/fallback/web",
    params(
        ("stage" = String, Path, description = "Stage type, e.g. m.login.recaptcha"),
        ("session" = String, Query, description = "Auth session id"),
    ),
    responses(
        (status = 200, description = "Stage passed, or the page again with the rejection", content_type = "text/html"),
        (status = 400, description = "Unknown session or stage type", body = ErrorResponse),
        (status = 404, description = "Stage has no web fallback", body = ErrorResponse)
    ),
    tag = "Fallback"
)]
pub async fn fallback_submit(
    State(state): State<AppState>,
    Path(stage): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    RawForm(form): RawForm,
) -> Result<Response, AppError> {
    let stage = StageType::from(stage);

    // The widget posts its fields in the body, but clients following the
    // original links put everything in the query string. Accept both,
    // body winning on conflicts.
    let mut fields = query;
    if !form.is_empty() {
        let form_fields: HashMap<String, String> = serde_urlencoded::from_bytes(&form)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed form body: {e}")))?;
        fields.extend(form_fields);
    }

    let session = fields
        .remove("session")
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing parameter: session")))?;
    let submission: Map<String, Value> = fields
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    if !has_web_ui(&stage) {
        return Err(no_web_ui_error(&state, stage));
    }

    let remote_ip = super::client_ip(&headers, connect_info.as_ref());
    match state
        .uia
        .complete_out_of_band(&stage, &session, &submission, remote_ip)
        .await?
    {
        StageAttempt::Passed => Ok(SuccessPage.into_response()),
        StageAttempt::Rejected(reason) => render_stage_page(&state, &stage, session, Some(reason)),
    }
}

fn has_web_ui(stage: &StageType) -> bool {
    matches!(stage.as_str(), well_known::RECAPTCHA | well_known::TERMS)
}

/// Stages the service knows but cannot render get a 404; everything else
/// is an unknown stage type.
fn no_web_ui_error(state: &AppState, stage: StageType) -> AppError {
    if state.uia.knows_stage(&stage) {
        AppError::NotFound(anyhow::anyhow!("Stage {stage} has no web fallback"))
    } else {
        ServiceError::UnknownStage(stage).into()
    }
}

fn render_stage_page(
    state: &AppState,
    stage: &StageType,
    session: String,
    error: Option<String>,
) -> Result<Response, AppError> {
    match stage.as_str() {
        well_known::RECAPTCHA if state.uia.knows_stage(stage) => Ok(RecaptchaPage {
            session,
            sitekey: state.config.recaptcha.public_key.clone(),
            error,
        }
        .into_response()),
        well_known::TERMS if state.uia.knows_stage(stage) => Ok(TermsPage {
            session,
            policies: vec![PolicyLink {
                name: state.config.terms.policy_name.clone(),
                url: state.config.terms.policy_url.clone(),
            }],
            error,
        }
        .into_response()),
        _ => Err(no_web_ui_error(state, stage.clone())),
    }
}
