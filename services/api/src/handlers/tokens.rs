//! Authentication token issuance

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use chrono::Duration;
use serde_json::json;

use crate::{
    error::{ApiError, ApiResult},
    json::{JsonBody, write_json},
    models::{
        Scope,
        user::{LoginCredentials, validate_email, validate_password_plaintext},
    },
    repositories::RepositoryError,
    state::AppState,
    validator::Validator,
};

/// How long an authentication token stays valid.
pub const AUTHENTICATION_TTL: Duration = Duration::hours(24);

/// POST /v1/tokens/authentication
pub async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<LoginCredentials>,
) -> ApiResult<Response> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let user = match state.repositories.users.get_by_email(&input.email).await {
        Ok(user) => user,
        Err(RepositoryError::NoRecord) => return Err(ApiError::InvalidCredentials),
        Err(err) => return Err(err.into()),
    };

    if !user
        .password
        .matches(&input.password)
        .map_err(ApiError::internal)?
    {
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .repositories
        .tokens
        .new_token(user.id, AUTHENTICATION_TTL, Scope::Authentication)
        .await?;

    Ok(write_json(
        StatusCode::CREATED,
        &json!({ "authentication_token": token }),
        HeaderMap::new(),
    ))
}
