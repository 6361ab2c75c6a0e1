//! TMDB (The Movie Database) v3 catalog provider
//!
//! Endpoints used:
//! - `/movie/{id}` → single movie details
//! - `/movie/{id}/similar` → similar movies, first page
//! - `/movie/popular` → popular movies, first page
//! - `/search/movie?query=` → title search, first page
//!
//! Every request carries the API key as the `api_key` query parameter and is
//! bounded by the client-wide timeout.

use reqwest::{Client as HttpClient, Url};
use serde::de::DeserializeOwned;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{CatalogEntry, TmdbMovie, TmdbPage},
    services::catalog::CatalogProvider,
};

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: Url,
}

impl TmdbProvider {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.upstream_timeout())
            .build()?;

        let api_url = Url::parse(&config.tmdb_api_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                AppError::Internal(format!("Invalid TMDB API URL: {}", config.tmdb_api_url))
            })?;

        Ok(Self {
            http_client,
            api_key: config.tmdb_api_key.clone(),
            api_url,
        })
    }

    /// Appends `segments` to the API base, percent-encoding each one so a
    /// caller-supplied id stays inside its own path segment
    fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal(format!("Invalid TMDB API URL: {}", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET the endpoint at `segments` and decode the JSON body
    async fn get<T: DeserializeOwned>(&self, segments: &[&str], query: &[(&str, &str)]) -> AppResult<T> {
        let url = self.endpoint(segments)?;

        let response = self
            .http_client
            .get(url.clone())
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("TMDB resource {}", url.path())));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamUnavailable(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json::<T>().await?)
    }

    async fn list(&self, segments: &[&str], query: &[(&str, &str)]) -> AppResult<Vec<CatalogEntry>> {
        let page: TmdbPage = self.get(segments, query).await?;
        let entries: Vec<CatalogEntry> = page.results.into_iter().map(CatalogEntry::from).collect();

        tracing::debug!(
            path = %segments.join("/"),
            results = entries.len(),
            provider = "tmdb",
            "Catalog list fetched"
        );

        Ok(entries)
    }
}

/// Dot segments are dropped by URL normalization, so they can never name a movie
fn movie_id(id: &str) -> AppResult<&str> {
    match id.trim() {
        "" | "." | ".." => Err(AppError::NotFound(format!("TMDB movie {:?}", id))),
        _ => Ok(id),
    }
}

#[async_trait::async_trait]
impl CatalogProvider for TmdbProvider {
    async fn movie(&self, id: &str) -> AppResult<CatalogEntry> {
        let movie: TmdbMovie = self.get(&["movie", movie_id(id)?], &[]).await?;
        Ok(movie.into())
    }

    async fn similar(&self, id: &str) -> AppResult<Vec<CatalogEntry>> {
        self.list(&["movie", movie_id(id)?, "similar"], &[]).await
    }

    async fn popular(&self) -> AppResult<Vec<CatalogEntry>> {
        self.list(&["movie", "popular"], &[]).await
    }

    async fn search(&self, query: &str) -> AppResult<Vec<CatalogEntry>> {
        if query.trim().is_empty() {
            return Err(AppError::Validation(
                "Search query cannot be empty".to_string(),
            ));
        }

        let entries = self.list(&["search", "movie"], &[("query", query)]).await?;

        tracing::info!(
            query = %query,
            results = entries.len(),
            provider = "tmdb",
            "Title search completed"
        );

        Ok(entries)
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
