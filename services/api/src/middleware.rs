//! Request middleware: panic recovery, CORS, rate limiting and authentication

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use serde_json::json;
use std::any::Any;
use std::net::SocketAddr;
use tracing::error;

use crate::{
    error::{ApiError, SERVER_ERROR_MESSAGE},
    json::write_json,
    models::{
        Scope, User,
        permission::{ITEMS_READ, ITEMS_WRITE},
        token::TOKEN_LENGTH,
    },
    repositories::RepositoryError,
    state::{AppState, panic_message},
};

/// The user a request acts as.
#[derive(Debug, Clone, Default)]
pub enum CurrentUser {
    #[default]
    Anonymous,
    Authenticated(User),
}

impl CurrentUser {
    pub fn user(&self) -> Option<&User> {
        match self {
            CurrentUser::Anonymous => None,
            CurrentUser::Authenticated(user) => Some(user),
        }
    }
}

/// Turn a handler panic into a 500 and ask the client to drop the connection.
///
/// Used with `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn recover_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    error!(panic = panic_message(panic.as_ref()), "{}", SERVER_ERROR_MESSAGE);

    let mut headers = HeaderMap::new();
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    write_json(
        StatusCode::INTERNAL_SERVER_ERROR,
        &json!({ "error": SERVER_ERROR_MESSAGE }),
        headers,
    )
}

/// Echo trusted origins and answer their preflight requests.
pub async fn enable_cors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .filter(|origin| {
            origin
                .to_str()
                .is_ok_and(|origin| state.config.cors_trusted_origins.contains(origin))
        })
        .cloned();

    let preflight = req.method() == Method::OPTIONS
        && req
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

    let mut response = match origin {
        Some(_) if preflight => StatusCode::OK.into_response(),
        _ => next.run(req).await,
    };

    let headers = response.headers_mut();
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
    headers.append(
        header::VARY,
        HeaderValue::from_static("Access-Control-Request-Method"),
    );

    if let Some(origin) = origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        if preflight {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("OPTIONS, PUT, PATCH, DELETE"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Authorization, Content-Type"),
            );
        }
    }

    response
}

/// Per-client token bucket keyed by the peer IP.
pub async fn rate_limit(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.limiter.enabled() {
        return Ok(next.run(req).await);
    }

    let ConnectInfo(addr) = connect_info.ok_or_else(|| {
        ApiError::internal(anyhow::anyhow!("peer address missing from request"))
    })?;

    if !state.limiter.check(addr.ip()) {
        return Err(ApiError::RateLimitExceeded);
    }

    Ok(next.run(req).await)
}

/// Resolve the bearer token, if any, to a [`CurrentUser`].
pub async fn authenticate(
    State(state): State<AppState>,
    authorization: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Response {
    let exact_scheme = has_exact_bearer_scheme(req.headers());
    let mut response = match current_user(&state, exact_scheme, authorization).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

/// The typed header accepts any casing of the scheme; clients must send `Bearer`.
fn has_exact_bearer_scheme(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .is_none_or(|value| value.as_bytes().starts_with(b"Bearer "))
}

async fn current_user(
    state: &AppState,
    exact_scheme: bool,
    authorization: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
) -> Result<CurrentUser, ApiError> {
    let bearer = match authorization {
        Ok(TypedHeader(Authorization(bearer))) => bearer,
        Err(rejection) if rejection.is_missing() => return Ok(CurrentUser::Anonymous),
        Err(_) => return Err(ApiError::InvalidAuthenticationToken),
    };

    let token = bearer.token();
    if !exact_scheme || token.len() != TOKEN_LENGTH {
        return Err(ApiError::InvalidAuthenticationToken);
    }

    match state
        .repositories
        .users
        .get_for_token(Scope::Authentication, token)
        .await
    {
        Ok(user) => Ok(CurrentUser::Authenticated(user)),
        Err(RepositoryError::NoRecord) => Err(ApiError::InvalidAuthenticationToken),
        Err(err) => Err(err.into()),
    }
}

fn activated_user(req: &Request) -> Result<&User, ApiError> {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .and_then(CurrentUser::user)
        .ok_or(ApiError::AuthenticationRequired)?;

    if !user.activated {
        return Err(ApiError::InactiveAccount);
    }
    Ok(user)
}

/// Reject anonymous and inactive users.
pub async fn require_activated_user(req: Request, next: Next) -> Result<Response, ApiError> {
    activated_user(&req)?;
    Ok(next.run(req).await)
}

/// Reject users lacking `code`; implies [`require_activated_user`].
pub async fn require_permission(
    state: &AppState,
    code: &str,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = activated_user(&req)?.id;

    let permissions = state
        .repositories
        .permissions
        .get_all_for_user(user_id)
        .await?;
    if !permissions.includes(code) {
        return Err(ApiError::NotPermitted);
    }

    Ok(next.run(req).await)
}

pub async fn require_items_read(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require_permission(&state, ITEMS_READ, req, next).await
}

pub async fn require_items_write(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require_permission(&state, ITEMS_WRITE, req, next).await
}
