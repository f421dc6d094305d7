use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Operation parameters of a registration request, deserialized from the
/// session's parameter snapshot once auth completes. The auth container
/// itself never appears here.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterParams {
    #[validate(length(min = 1, max = 255, message = "Username must be 1-255 characters"))]
    #[schema(example = "alice")]
    pub username: Option<String>,

    #[schema(example = "s3cret-passw0rd")]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    #[schema(example = "@alice:example.com")]
    pub user_id: String,
    #[schema(example = "MDAxmCBsb2NhbGhvc3QgjAKy")]
    pub access_token: String,
    #[schema(example = "example.com")]
    pub home_server: String,
}
