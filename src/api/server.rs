//! HTTP server implementation for the API

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use super::models::{
    ApiResponse, HealthStatus, ProcessResponse, ReviewRequest, ReviewResponse, SearchHit,
    SearchResponse,
};
use crate::matcher::{apply_review_selection, ExerciseMatcher};
use crate::request::ProcessRequest;
use crate::service::ProcessService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProcessService>,
    pub matcher: Arc<ExerciseMatcher>,
}

/// Configure and start the HTTP server
pub async fn start_http_server(state: AppState, port: u16) -> Result<()> {
    info!("🚀 Starting HTTP server on port {}", port);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
        .route("/api/process", post(process_handler))
        .route("/api/review", post(review_handler))
        .route("/api/catalog/search", get(search_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("🌐 API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_available: state.service.model_available().await,
    };
    (StatusCode::OK, Json(ApiResponse::success(status)))
}

/// Run the full pipeline for one shared link, then match the inferred
/// exercises against the catalog. The response always carries one match
/// per exercise, in order.
async fn process_handler(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> impl IntoResponse {
    let result = state.service.process(request).await;
    let matches = state.matcher.match_workout(&result.exercises);

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    (status, Json(ProcessResponse { result, matches }))
}

/// Apply one manual catalog correction and return the updated match list
async fn review_handler(
    State(state): State<AppState>,
    Json(request): Json<ReviewRequest>,
) -> impl IntoResponse {
    let Some(chosen) = state.matcher.find_by_id(&request.catalog_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<ReviewResponse>::error(format!(
                "unknown catalog exercise '{}'",
                request.catalog_id
            ))),
        );
    };

    let mut matches = request.matches;
    if let Err(e) = apply_review_selection(&mut matches, request.index, &chosen) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(e.to_string())),
        );
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(ReviewResponse { matches })),
    )
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
}

/// Ranked catalog search for the manual picker
async fn search_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let results = state
        .matcher
        .search(&query.q)
        .into_iter()
        .map(|(exercise, score)| SearchHit { exercise, score })
        .collect();

    (
        StatusCode::OK,
        Json(ApiResponse::success(SearchResponse { results })),
    )
}
