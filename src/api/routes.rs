use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/ml", ml_routes())
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        // wraps TraceLayer so the span sees the request id
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Recommendation routes under /ml
fn ml_routes() -> Router<AppState> {
    Router::new()
        // Recommendations
        .route("/recommend/movies", post(handlers::recommend_movies))
        .route("/recommend/similar", post(handlers::recommend_similar))
        .route("/recommend/blogs", post(handlers::recommend_blogs))
        // Explanations
        .route("/explain", post(handlers::explain))
        // Catalog
        .route("/movies/:movie_id", get(handlers::movie_details))
        // Interactions
        .route("/track-interaction", post(handlers::track_interaction))
}
