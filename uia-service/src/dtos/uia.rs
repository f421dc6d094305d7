use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::models::{AuthFlow, StageType};

/// Challenge body answered with status 401 while auth is unfinished.
///
/// Everything a client needs to continue: which session to quote back,
/// the acceptable stage combinations, public stage metadata, and what has
/// already been completed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UiaChallenge {
    #[serde(rename = "session")]
    #[schema(example = "xCsQRnkcaIbqdiAkFnyCdVNL")]
    pub session_id: String,

    /// Each flow is a bare list of stage identifiers.
    #[schema(value_type = Vec<Vec<String>>)]
    pub flows: Vec<AuthFlow>,

    /// Public per-stage metadata, keyed by stage identifier.
    #[schema(value_type = Object)]
    pub params: Map<String, Value>,

    /// Stages completed so far, in stable order.
    #[schema(value_type = Vec<String>)]
    pub completed: Vec<StageType>,

    /// Why the submitted stage was rejected, when one was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
