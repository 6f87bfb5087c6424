use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::services::ResultCache;

#[derive(Clone)]
pub struct CacheAdminState {
    pub cache: Arc<ResultCache>,
    pub admin_token: String,
}

#[derive(Deserialize)]
pub struct AuthQuery {
    token: String,
}

/// Operational routes for the result cache, nested under `/cache`
pub fn create_cache_admin_router(cache: Arc<ResultCache>, admin_token: String) -> Router {
    let state = CacheAdminState { cache, admin_token };

    Router::new()
        .route("/stats", get(get_cache_stats))
        .route("/:dish", delete(invalidate_dish))
        .with_state(state)
}

fn verify_token(query: &AuthQuery, admin_token: &str) -> Result<(), StatusCode> {
    if query.token == admin_token {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Key count, memory and server version, or `{ "error": ... }` if the store is down
async fn get_cache_stats(
    Query(query): Query<AuthQuery>,
    State(state): State<CacheAdminState>,
) -> Result<impl IntoResponse, StatusCode> {
    verify_token(&query, &state.admin_token)?;

    Ok((StatusCode::OK, Json(state.cache.stats().await)))
}

/// Drop the cached estimate for one dish so the next request recomputes it
async fn invalidate_dish(
    Path(dish): Path<String>,
    Query(query): Query<AuthQuery>,
    State(state): State<CacheAdminState>,
) -> Result<impl IntoResponse, StatusCode> {
    verify_token(&query, &state.admin_token)?;

    let invalidated = state.cache.invalidate(&dish).await;
    if !invalidated {
        log::error!("Failed to invalidate cache entry for {}", dish);
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "dish": dish, "invalidated": invalidated })),
    ))
}
