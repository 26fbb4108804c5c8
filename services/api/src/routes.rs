//! Item service routes

use axum::{
    BoxError, Router,
    error_handling::HandleErrorLayer,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    middleware::from_fn_with_state,
    response::Response,
    routing::{MethodRouter, delete, get, patch, post, put},
};
use anyhow::anyhow;
use serde_json::json;
use std::time::Duration;
use tower::{ServiceBuilder, timeout::error::Elapsed};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{
    config::VERSION,
    error::ApiError,
    handlers::{items, tokens, users},
    json::write_json,
    metrics::{debug_vars, track_metrics},
    middleware::{
        authenticate, enable_cors, rate_limit, recover_panic, require_items_read,
        require_items_write,
    },
    state::AppState,
};

/// Deadline for producing a response to any one request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the router for the item service
///
/// Middleware runs outer to inner: metrics, tracing, panic recovery, request
/// deadline, CORS, rate limiting, authentication. Item routes additionally check permissions.
pub fn create_router(state: AppState) -> Router {
    let read = || from_fn_with_state(state.clone(), require_items_read);
    let write = || from_fn_with_state(state.clone(), require_items_write);

    let item_collection = get(items::list_items)
        .route_layer(read())
        .merge(post(items::create_item).route_layer(write()));

    let item_member = get(items::show_item)
        .route_layer(read())
        .merge(
            patch(items::update_item)
                .merge(delete(items::delete_item))
                .route_layer(write()),
        );

    Router::new()
        .route("/v1/healthcheck", with_405(get(healthcheck)))
        .route("/v1/items", with_405(item_collection))
        .route("/v1/items/:id", with_405(item_member))
        .route("/v1/users", with_405(post(users::register_user)))
        .route("/v1/users/activated", with_405(put(users::activate_user)))
        .route(
            "/v1/tokens/authentication",
            with_405(post(tokens::create_authentication_token)),
        )
        .route("/debug/vars", with_405(get(debug_vars)))
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(from_fn_with_state(state.clone(), enable_cors))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(request_failed))
                .timeout(REQUEST_TIMEOUT),
        )
        .layer(CatchPanicLayer::custom(recover_panic))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), track_metrics))
        .with_state(state)
}

fn with_405(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(method_not_allowed)
}

async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}

async fn request_failed(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        ApiError::internal(anyhow!("request timed out after {REQUEST_TIMEOUT:?}"))
    } else {
        ApiError::internal(anyhow!("request failed: {err}"))
    }
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// GET /v1/healthcheck
pub async fn healthcheck(State(state): State<AppState>) -> Response {
    write_json(
        StatusCode::OK,
        &json!({
            "status": "available",
            "system_info": {
                "environment": state.config.env.as_str(),
                "version": VERSION,
            }
        }),
        HeaderMap::new(),
    )
}
