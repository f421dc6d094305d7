use service_core::error::AppError;
use thiserror::Error;

use crate::models::StageType;
use crate::services::session_store::SessionStoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unknown or expired auth session")]
    InvalidSession,

    #[error("Requested operation has changed during the auth session")]
    OperationMismatch,

    #[error("Unrecognised auth stage: {0}")]
    UnknownStage(StageType),

    #[error("User ID already taken")]
    UserInUse,

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Missing parameter: {0}")]
    MissingParam(&'static str),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SessionStoreError> for ServiceError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::UnknownSession => ServiceError::InvalidSession,
            SessionStoreError::Backend(e) => ServiceError::Internal(e),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidSession => {
                AppError::BadRequest(anyhow::anyhow!("Unknown or expired auth session"))
            }
            ServiceError::OperationMismatch => AppError::Forbidden(anyhow::anyhow!(
                "Requested operation has changed during the auth session"
            )),
            ServiceError::UnknownStage(stage) => {
                AppError::BadRequest(anyhow::anyhow!("Unrecognised auth stage: {stage}"))
            }
            ServiceError::UserInUse => {
                AppError::BadRequest(anyhow::anyhow!("User ID already taken"))
            }
            ServiceError::InvalidUsername(reason) => {
                AppError::BadRequest(anyhow::anyhow!("Invalid username: {reason}"))
            }
            ServiceError::MissingParam(name) => {
                AppError::BadRequest(anyhow::anyhow!("Missing parameter: {name}"))
            }
            ServiceError::Validation(e) => AppError::ValidationError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
