//! Item handlers

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use serde_json::json;

use crate::{
    error::{ApiError, ApiResult},
    handlers::{QueryString, read_csv, read_id_param, read_int, read_string},
    json::{JsonBody, read_json, write_json},
    models::{
        Filters, Item, ItemPatch,
        filters::validate_filters,
        item::{NewItem, validate_item},
    },
    state::AppState,
    validator::Validator,
};

/// Sort keys accepted by the list endpoint.
pub const SORT_SAFELIST: &[&str] = &[
    "id", "name", "model", "supplier", "price", "-id", "-name", "-model", "-supplier", "-price",
];

fn validated(item: &Item) -> ApiResult<()> {
    let mut v = Validator::new();
    validate_item(&mut v, item);
    if v.valid() {
        Ok(())
    } else {
        Err(ApiError::FailedValidation(v.into_errors()))
    }
}

/// POST /v1/items
pub async fn create_item(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<NewItem>,
) -> ApiResult<Response> {
    let mut item = Item::from(input);
    validated(&item)?;

    state.repositories.items.insert(&mut item).await?;

    let mut headers = HeaderMap::new();
    let location = format!("/v1/items/{}", item.id);
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&location).map_err(ApiError::internal)?,
    );

    Ok(write_json(
        StatusCode::CREATED,
        &json!({ "item": item }),
        headers,
    ))
}

/// GET /v1/items/:id
pub async fn show_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = read_id_param(&id)?;
    let item = state.repositories.items.get(id).await?;

    Ok(write_json(
        StatusCode::OK,
        &json!({ "item": item }),
        HeaderMap::new(),
    ))
}

/// PATCH /v1/items/:id
///
/// The body is decoded only once the item is known to exist.
pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let id = read_id_param(&id)?;
    let mut item = state.repositories.items.get(id).await?;

    let patch: ItemPatch = read_json(&body)?;
    patch.apply(&mut item);
    validated(&item)?;

    state.repositories.items.update(&mut item).await?;

    Ok(write_json(
        StatusCode::OK,
        &json!({ "item": item }),
        HeaderMap::new(),
    ))
}

/// DELETE /v1/items/:id
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = read_id_param(&id)?;
    state.repositories.items.delete(id).await?;

    Ok(write_json(
        StatusCode::OK,
        &json!({ "message": "item successfully deleted" }),
        HeaderMap::new(),
    ))
}

/// GET /v1/items
pub async fn list_items(
    State(state): State<AppState>,
    Query(qs): Query<QueryString>,
) -> ApiResult<Response> {
    let mut v = Validator::new();

    let name = read_string(&qs, "name", "");
    let supplier = read_int(&qs, "supplier", 0, &mut v);
    let tags = read_csv(&qs, "tags", Vec::new());

    let filters = Filters {
        page: read_int(&qs, "page", 1, &mut v),
        page_size: read_int(&qs, "page_size", 20, &mut v),
        sort: read_string(&qs, "sort", "id"),
        sort_safelist: SORT_SAFELIST.iter().map(|s| s.to_string()).collect(),
    };

    validate_filters(&mut v, &filters);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let (items, metadata) = state
        .repositories
        .items
        .get_all(&name, supplier, &tags, &filters)
        .await?;

    Ok(write_json(
        StatusCode::OK,
        &json!({ "items": items, "metadata": metadata }),
        HeaderMap::new(),
    ))
}
