//! Custom error types for the item service

use axum::{
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{
    json::{JsonError, write_json},
    repositories::RepositoryError,
    validator::ValidationErrors,
};

/// Every failure a handler or middleware can answer with.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed request, typically a body the JSON codec rejected
    #[error("{0}")]
    BadRequest(String),

    /// Input decoded but failed validation
    #[error("failed validation")]
    FailedValidation(ValidationErrors),

    /// Email/password pair does not match a user
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    /// Authorization header present but unusable
    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,

    /// Anonymous request to a route that needs a user
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("account must be activated")]
    InactiveAccount,

    #[error("not permitted")]
    NotPermitted,

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(Method),

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Anything the client cannot act on; logged, never echoed
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Message sent to clients in place of internal error details.
pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process the request";

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InvalidCredentials
            | ApiError::InvalidAuthenticationToken
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::InactiveAccount | ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut headers = HeaderMap::new();

        let body = match self {
            ApiError::FailedValidation(errors) => json!({ "error": errors }),
            ApiError::Internal(err) => {
                error!(error = %err, "{}", SERVER_ERROR_MESSAGE);
                json!({ "error": SERVER_ERROR_MESSAGE })
            }
            ApiError::InvalidAuthenticationToken => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                json!({ "error": ApiError::InvalidAuthenticationToken.to_string() })
            }
            other => json!({ "error": other.to_string() }),
        };

        write_json(status, &body, headers)
    }
}

impl From<JsonError> for ApiError {
    fn from(err: JsonError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NoRecord => ApiError::NotFound,
            RepositoryError::EditConflict => ApiError::EditConflict,
            other => ApiError::Internal(other.into()),
        }
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
