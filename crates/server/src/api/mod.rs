//! REST API layer built on Axum.
//!
//! Provides HTTP handlers for library/document/chunk management, index
//! builds, and search. Middleware covers request timeouts, body size
//! limits, CORS, request ID tracing, and metrics collection.

/// API error types mapped to HTTP status codes.
pub mod errors;
/// HTTP request handlers and application state.
pub mod handlers;
/// Prometheus metrics recording.
pub mod metrics;
/// Request and response data transfer objects.
pub mod models;

use axum::error_handling::HandleErrorLayer;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::time::{Duration, Instant};
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use corpusdb_core::config;
use handlers::AppState;

async fn request_id_middleware(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", request_id = %request_id);
    async move {
        let mut response = next.run(req).await;
        response.headers_mut().insert(
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::HeaderValue::from_str(&request_id)
                .expect("UUID v4 is always valid ASCII for header values"),
        );
        response
    }
    .instrument(span)
    .await
}

async fn metrics_middleware(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(req).await;
    metrics::record_request(&method, &path, response.status().as_u16(), start.elapsed());
    response
}

/// Builds the Axum router with all routes and middleware layers.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route(
            "/libraries",
            get(handlers::list_libraries).post(handlers::create_library),
        )
        .route(
            "/libraries/:id",
            get(handlers::get_library)
                .put(handlers::update_library)
                .delete(handlers::delete_library),
        )
        .route("/libraries/:id/index", post(handlers::build_index))
        .route("/libraries/:id/stats", get(handlers::library_stats))
        .route("/libraries/:id/analytics", get(handlers::library_analytics))
        .route(
            "/libraries/:id/documents",
            get(handlers::list_documents).post(handlers::create_document),
        )
        .route(
            "/libraries/:id/documents/:did",
            get(handlers::get_document)
                .put(handlers::update_document)
                .delete(handlers::delete_document),
        )
        .route(
            "/libraries/:id/documents/:did/chunks",
            get(handlers::list_chunks).post(handlers::append_chunks),
        )
        .route(
            "/libraries/:id/documents/:did/chunks/:cid",
            get(handlers::get_chunk)
                .put(handlers::update_chunk)
                .delete(handlers::delete_chunk),
        )
        .route("/search/libraries", post(handlers::search_libraries))
        .route("/search/libraries/:id", post(handlers::search_library))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(config::MAX_REQUEST_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|err: tower::BoxError| async move {
                    if err.is::<tower::timeout::error::Elapsed>() {
                        StatusCode::REQUEST_TIMEOUT
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                }))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config::REQUEST_TIMEOUT_SECS,
                ))),
        )
        .with_state(state)
}
