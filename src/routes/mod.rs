use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

pub mod documents;
pub mod health;

/// Multipart framing and form fields on top of the largest accepted file.
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return None;
                }
                match trimmed.parse::<HeaderValue>() {
                    Ok(origin) => Some(origin),
                    Err(_) => {
                        warn!(origin = trimmed, "ignoring invalid CORS allowed origin");
                        None
                    }
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let body_limit = state.config.max_file_size.saturating_add(BODY_LIMIT_SLACK);

    Router::new()
        .route("/api/upload", post(documents::upload_document))
        .route("/api/process/:id", post(documents::trigger_processing))
        .route("/api/status/:id", get(documents::get_status))
        .route("/api/download/:id", get(documents::download_document))
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
