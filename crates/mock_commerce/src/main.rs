use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::{
    domain::{CartLineId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{AddCartLineRequest, UpdateCartLineRequest},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;

use api::{CatalogQuery, CommerceStore, ProductPage};
use config::{load_catalog, load_settings};

/// Unpaged endpoints return every match up to this many items.
const UNPAGED_LIMIT: u32 = 100;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Clone)]
struct AppState {
    store: CommerceStore,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartQuery {
    user_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
struct Listing {
    success: bool,
    #[serde(flatten)]
    page: ProductPage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let products = load_catalog(&settings)?;
    let store = CommerceStore::new(products);
    info!(products = store.product_count().await, "catalog loaded");

    let app = build_router(Arc::new(AppState { store }));
    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "mock commerce listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/products", get(list_all))
        .route("/api/products/catId", get(list_by_category))
        .route("/api/products/subCatId", get(list_by_sub_category))
        .route("/api/products/fiterByPrice", get(filter_by_price))
        .route("/api/products/rating", get(filter_by_rating))
        .route("/api/search", get(search))
        .route("/api/cart", get(cart))
        .route("/api/cart/add", post(add_cart_line))
        .route("/api/cart/:line_id", put(update_cart_line).delete(remove_cart_line))
        .with_state(state)
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::OutOfStock => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(message = %err.message, "request failed");
    }
    (status, Json(err))
}

fn missing(param: &str) -> (StatusCode, Json<ApiError>) {
    reject(ApiError::new(
        ErrorCode::Validation,
        format!("query parameter '{param}' is required"),
    ))
}

fn unpaged(query: CatalogQuery) -> CatalogQuery {
    CatalogQuery {
        page: Some(1),
        per_page: Some(UNPAGED_LIMIT),
        ..query
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn listing(state: &AppState, query: &CatalogQuery) -> ApiResult<Json<Listing>> {
    let page = state.store.list_products(query).await.map_err(reject)?;
    Ok(Json(Listing {
        success: true,
        page,
    }))
}

async fn list_all(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Listing>> {
    listing(&state, &query).await
}

async fn list_by_category(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Listing>> {
    if query.cat_id.is_none() {
        return Err(missing("catId"));
    }
    listing(&state, &query).await
}

async fn list_by_sub_category(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Listing>> {
    if query.sub_cat_id.is_none() {
        return Err(missing("subCatId"));
    }
    listing(&state, &query).await
}

async fn filter_by_price(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Value>> {
    if query.min_price.is_none() || query.max_price.is_none() {
        return Err(missing("minPrice/maxPrice"));
    }
    let page = state
        .store
        .list_products(&unpaged(query))
        .await
        .map_err(reject)?;
    Ok(Json(json!({ "success": true, "data": page.products })))
}

async fn filter_by_rating(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Value>> {
    if query.rating.is_none() {
        return Err(missing("rating"));
    }
    let page = state
        .store
        .list_products(&unpaged(query))
        .await
        .map_err(reject)?;
    Ok(Json(json!(page.products)))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let text = query.q.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(missing("q"));
    }
    let products = state.store.search(&text).await;
    Ok(Json(json!({
        "success": true,
        "data": { "total": products.len(), "products": products }
    })))
}

async fn cart(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CartQuery>,
) -> ApiResult<Json<Value>> {
    let user_id = query.user_id.ok_or_else(|| missing("userId"))?;
    let lines = state.store.cart(&user_id).await;
    Ok(Json(json!({ "success": true, "data": lines })))
}

async fn add_cart_line(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddCartLineRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let record = state.store.add_line(req).await.map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": record })),
    ))
}

async fn update_cart_line(
    State(state): State<Arc<AppState>>,
    Path(line_id): Path<CartLineId>,
    Json(req): Json<UpdateCartLineRequest>,
) -> ApiResult<Json<Value>> {
    let record = state
        .store
        .update_line(&line_id, req)
        .await
        .map_err(reject)?;
    Ok(Json(json!({ "success": true, "data": record })))
}

async fn remove_cart_line(
    State(state): State<Arc<AppState>>,
    Path(line_id): Path<CartLineId>,
) -> ApiResult<Json<Value>> {
    let removed = state.store.remove_line(&line_id).await.map_err(reject)?;
    Ok(Json(json!({ "success": true, "data": removed })))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
