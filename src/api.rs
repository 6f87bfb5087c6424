use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::{request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::handlers::{EstimationHandler, ImageEstimateError};
use crate::models::{EstimateRequest, EstimateResult, ImageSource};
use crate::services::EstimateError;

pub mod cache_admin;

/// Request body cap, sized for phone photos
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const IMAGE_NOT_FOOD_MESSAGE: &str =
    "This image does not contain food. Please upload a clear image of a dish or meal.";

pub struct AppState {
    pub handler: Arc<EstimationHandler>,
}

/// Error body in the `{ "detail": "..." }` shape the frontend reads
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub fn create_router(
    handler: Arc<EstimationHandler>,
    cors_origins: &[String],
    admin_token: Option<String>,
) -> Router {
    let cache = handler.cache().clone();
    let state = Arc::new(AppState { handler });

    let mut router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/estimate", post(estimate_handler))
        .route("/estimate/image", post(estimate_image_handler))
        .with_state(state);

    match admin_token {
        Some(token) => {
            router = router.nest("/cache", cache_admin::create_cache_admin_router(cache, token));
        }
        None => log::warn!("⚠️ ADMIN_TOKEN not set, cache admin routes disabled"),
    }

    router.layer(
        ServiceBuilder::new()
            .layer(cors_layer(cors_origins))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins = origins.to_vec();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request: &Parts| {
                origin
                    .to_str()
                    .map(|origin| origins.iter().any(|allowed| origin_matches(allowed, origin)))
                    .unwrap_or(false)
            },
        ))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Exact match, or `scheme://*.domain` matching any subdomain of `domain`.
fn origin_matches(allowed: &str, origin: &str) -> bool {
    match allowed.split_once("*.") {
        Some((scheme, domain)) => origin
            .strip_prefix(scheme)
            .and_then(|host| host.strip_suffix(domain))
            .and_then(|subdomain| subdomain.strip_suffix('.'))
            .map(|subdomain| !subdomain.is_empty())
            .unwrap_or(false),
        None => allowed == origin,
    }
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": "Carbon Footprint API is running!" }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "carbon-footprint-backend" }))
}

async fn estimate_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EstimateRequest>, JsonRejection>,
) -> Result<Json<EstimateResult>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError {
        status: rejection.status(),
        detail: rejection.body_text(),
    })?;

    let dish = request.dish.trim();
    if dish.is_empty() {
        return Err(ApiError::bad_request("Dish name must not be empty"));
    }

    log::info!("🍽️ Estimate requested for dish: {}", dish);

    match state.handler.estimate_dish(dish).await {
        Ok(result) => Ok(Json(result)),
        Err(EstimateError::NotFood(message)) => {
            log::info!("🚫 Non-food input rejected: {}", dish);
            Err(ApiError::bad_request(message))
        }
        Err(e) => {
            log::error!("❌ Estimate failed for {}: {}", dish, e);
            Err(ApiError::internal(format!("Error: {}", e)))
        }
    }
}

async fn estimate_image_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<EstimateResult>, ApiError> {
    let image = read_image_form(&mut multipart).await?;
    log::info!("📸 Image estimate requested: {}", image.describe());

    match state.handler.estimate_image(&image).await {
        Ok(result) => Ok(Json(result)),
        Err(ImageEstimateError::Identification(e)) => {
            log::error!("❌ Error in vision analysis: {}", e);
            Err(ApiError::internal(format!("Failed to analyze food image: {}", e)))
        }
        Err(ImageEstimateError::Estimation { dish, error }) if error.is_not_food() => {
            log::info!("🚫 Vision identified non-food item: {}", dish);
            Err(ApiError::bad_request(IMAGE_NOT_FOOD_MESSAGE))
        }
        Err(ImageEstimateError::Estimation { dish, error }) => {
            log::error!("❌ LLM error for dish {} (from image): {}", dish, error);
            Err(ApiError::internal(format!("LLM Error: {}", error)))
        }
    }
}

/// Reads exactly one of `file` or `image_url` from the form.
async fn read_image_form(multipart: &mut Multipart) -> Result<ImageSource, ApiError> {
    let mut upload = None;
    let mut image_url = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Could not read file: {}", e)))?;

                // Browsers send an empty part when no file was picked
                if !bytes.is_empty() {
                    upload = Some(ImageSource::Upload {
                        bytes: bytes.to_vec(),
                        content_type,
                        filename,
                    });
                }
            }
            "image_url" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Could not read image_url: {}", e)))?;
                if !text.trim().is_empty() {
                    image_url = Some(text.trim().to_string());
                }
            }
            other => log::debug!("Ignoring unexpected form field: {}", other),
        }
    }

    match (upload, image_url) {
        (Some(upload), None) => Ok(upload),
        (None, Some(url)) => Ok(ImageSource::Url(url)),
        (None, None) => Err(ApiError::bad_request(
            "Either file or image_url must be provided",
        )),
        (Some(_), Some(_)) => Err(ApiError::bad_request(
            "Provide either file or image_url, not both",
        )),
    }
}
