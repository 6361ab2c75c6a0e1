use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{Candidate, MatchedMovie},
    services::{recommendations::DEFAULT_LIMIT, similar::DEFAULT_SIMILAR_LIMIT},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendMoviesRequest {
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendMoviesResponse {
    pub user_id: String,
    pub recommendations: Vec<Candidate>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendSimilarRequest {
    pub movie_title: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendSimilarResponse {
    pub movie_title: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_movie: Option<MatchedMovie>,
    pub recommendations: Vec<Candidate>,
    pub count: usize,
}

/// A history movie sent to the explain endpoint, either a bare title or a
/// playlist record
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UserMovie {
    Title(String),
    Record {
        #[serde(rename = "movieTitle", alias = "movie_title", alias = "title")]
        title: String,
    },
}

impl UserMovie {
    fn into_title(self) -> String {
        match self {
            UserMovie::Title(title) | UserMovie::Record { title } => title,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRequest {
    #[serde(default)]
    pub user_movies: Vec<UserMovie>,
    pub recommended_movie: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainResponse {
    pub explanation: String,
    pub llm_enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendBlogsRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieResponse {
    pub movie_id: String,
    pub title: String,
    pub year: Option<String>,
    pub poster_url: Option<String>,
    pub score: f64,
}

/// Treats absent and blank strings alike
fn required(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::missing_field(field))
}

// Handlers

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": state.config.service_name,
    }))
}

/// Personalized movie recommendations for a user
pub async fn recommend_movies(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RecommendMoviesRequest>,
) -> Response {
    let user_id = match required(request.user_id, "userId") {
        Ok(user_id) => user_id,
        Err(e) => return e.into_response(),
    };
    let limit = request.limit.unwrap_or(DEFAULT_LIMIT);

    tracing::info!(
        request_id = %request_id,
        user_id = %user_id,
        limit,
        "Processing movie recommendation request"
    );

    match state.recommender.recommend(&user_id, limit).await {
        Ok(recommendations) => Json(RecommendMoviesResponse {
            count: recommendations.len(),
            user_id,
            recommendations,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Error generating recommendations");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "userId": user_id,
                    "recommendations": [],
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Movies similar to a free-text title
pub async fn recommend_similar(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RecommendSimilarRequest>,
) -> Response {
    let movie_title = match required(request.movie_title, "movieTitle") {
        Ok(title) => title,
        Err(e) => return e.into_response(),
    };
    let limit = request.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);

    tracing::info!(
        request_id = %request_id,
        movie_title = %movie_title,
        limit,
        "Processing similar movie request"
    );

    match state.resolver.find_similar_by_title(&movie_title, limit).await {
        Ok(similar) => {
            let matched_movie = similar
                .matched
                .as_ref()
                .map(|entry| MatchedMovie::from_entry(entry, state.resolver.image_base_url()));

            Json(RecommendSimilarResponse {
                movie_title,
                found: similar.found,
                matched_movie,
                count: similar.candidates.len(),
                recommendations: similar.candidates,
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Error finding similar movies");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "movieTitle": movie_title,
                    "recommendations": [],
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Explains a single recommendation against the given history
pub async fn explain(
    State(state): State<AppState>,
    Json(request): Json<ExplainRequest>,
) -> AppResult<Json<ExplainResponse>> {
    let recommended_movie = required(request.recommended_movie, "recommendedMovie")?;
    let history_titles: Vec<String> = request
        .user_movies
        .into_iter()
        .map(UserMovie::into_title)
        .collect();

    let explanation = state
        .explainer
        .explain(&history_titles, &recommended_movie)
        .await;

    Ok(Json(ExplainResponse {
        explanation,
        llm_enabled: state.explainer.is_generative(),
    }))
}

/// Accepts interaction events; nothing is stored yet
pub async fn track_interaction(
    Extension(request_id): Extension<RequestId>,
    payload: Option<Json<Value>>,
) -> Json<Value> {
    tracing::debug!(
        request_id = %request_id,
        has_payload = payload.is_some(),
        "Interaction received"
    );

    Json(json!({
        "success": true,
        "message": "Interaction tracked",
    }))
}

/// Blog recommendations; always empty for now
pub async fn recommend_blogs(Json(request): Json<RecommendBlogsRequest>) -> Json<Value> {
    Json(json!({
        "userId": request.user_id,
        "recommendations": [],
    }))
}

/// Catalog details for a single movie
pub async fn movie_details(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
) -> AppResult<Json<MovieResponse>> {
    let entry = state
        .catalog
        .fetch_by_id(&movie_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Movie {} not found", movie_id)))?;

    Ok(Json(MovieResponse {
        poster_url: entry.poster_url(&state.config.tmdb_image_base_url),
        movie_id: entry.catalog_id,
        title: entry.title,
        year: entry.release_year,
        score: entry.quality_score,
    }))
}
