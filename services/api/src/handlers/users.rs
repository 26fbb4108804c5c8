//! User registration and activation

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::{
    error::{ApiError, ApiResult},
    json::{JsonBody, write_json},
    mailer::WelcomeEmail,
    models::{
        Scope, User,
        permission::ITEMS_READ,
        token::validate_token_plaintext,
        user::{NewUser, validate_password_plaintext, validate_user},
    },
    repositories::RepositoryError,
    state::AppState,
    validator::Validator,
};

/// How long an activation token stays valid.
pub const ACTIVATION_TTL: Duration = Duration::days(3);

/// POST /v1/users
pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<NewUser>,
) -> ApiResult<Response> {
    let mut user = User {
        name: input.name,
        email: input.email,
        activated: false,
        ..User::default()
    };

    let mut v = Validator::new();
    validate_user(&mut v, &user);
    validate_password_plaintext(&mut v, &input.password);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    user.password
        .set(&input.password)
        .map_err(ApiError::internal)?;

    match state.repositories.users.insert(&mut user).await {
        Ok(()) => {}
        Err(RepositoryError::DuplicateEmail) => {
            let mut v = Validator::new();
            v.add_error("email", "a user with this email already exists");
            return Err(ApiError::FailedValidation(v.into_errors()));
        }
        Err(err) => return Err(err.into()),
    }

    state
        .repositories
        .permissions
        .add_for_user(user.id, &[ITEMS_READ])
        .await?;

    let token = state
        .repositories
        .tokens
        .new_token(user.id, ACTIVATION_TTL, Scope::Activation)
        .await?;

    let mailer = state.mailer.clone();
    let recipient = user.email.clone();
    let email = WelcomeEmail {
        user_id: user.id,
        activation_token: token.plaintext,
    }
    .render();
    state.background(async move {
        match mailer.send(&recipient, email).await {
            Ok(()) => info!(%recipient, "welcome email sent"),
            Err(err) => error!(%recipient, error = %err, "failed to send welcome email"),
        }
    });

    Ok(write_json(
        StatusCode::ACCEPTED,
        &json!({ "user": user }),
        HeaderMap::new(),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivationRequest {
    pub token: String,
}

/// PUT /v1/users/activated
pub async fn activate_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivationRequest>,
) -> ApiResult<Response> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let mut user = match state
        .repositories
        .users
        .get_for_token(Scope::Activation, &input.token)
        .await
    {
        Ok(user) => user,
        Err(RepositoryError::NoRecord) => {
            v.add_error("token", "invalid or expired activation token");
            return Err(ApiError::FailedValidation(v.into_errors()));
        }
        Err(err) => return Err(err.into()),
    };

    user.activated = true;
    state.repositories.users.update(&mut user).await?;

    state
        .repositories
        .tokens
        .delete_all_for_user(Scope::Activation, user.id)
        .await?;

    Ok(write_json(
        StatusCode::OK,
        &json!({ "user": user }),
        HeaderMap::new(),
    ))
}
