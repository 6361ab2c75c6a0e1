//! Movie catalog access
//!
//! `CatalogProvider` is the raw, fallible contract a catalog backend (TMDB)
//! implements. `Catalog` wraps a provider and applies the request-level
//! policy: a failed lookup degrades to an empty or missing result and leaves
//! a warning in the log naming the operation that failed.

use std::sync::Arc;

use tracing::instrument;

use crate::{error::AppResult, models::CatalogEntry};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Trait for movie catalog providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Fetch a single movie by provider id
    async fn movie(&self, id: &str) -> AppResult<CatalogEntry>;

    /// Movies similar to `id`, in provider order
    async fn similar(&self, id: &str) -> AppResult<Vec<CatalogEntry>>;

    /// Currently popular movies, in provider order
    async fn popular(&self) -> AppResult<Vec<CatalogEntry>>;

    /// Free-text title search, in provider relevance order
    async fn search(&self, query: &str) -> AppResult<Vec<CatalogEntry>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Catalog client used by the recommendation services
#[derive(Clone)]
pub struct Catalog {
    provider: Arc<dyn CatalogProvider>,
}

impl Catalog {
    pub fn new(provider: Arc<dyn CatalogProvider>) -> Self {
        Self { provider }
    }

    /// Looks up one movie; None on any provider failure
    #[instrument(skip(self))]
    pub async fn fetch_by_id(&self, id: &str) -> Option<CatalogEntry> {
        match self.provider.movie(id).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, movie_id = %id, "Catalog lookup failed");
                None
            }
        }
    }

    /// At most `limit` movies similar to `id`; empty on failure
    #[instrument(skip(self))]
    pub async fn fetch_similar(&self, id: &str, limit: usize) -> Vec<CatalogEntry> {
        let mut entries = self.degrade("similar", self.provider.similar(id).await);
        entries.truncate(limit);
        entries
    }

    /// At most `limit` popular movies; empty on failure
    #[instrument(skip(self))]
    pub async fn fetch_popular(&self, limit: usize) -> Vec<CatalogEntry> {
        let mut entries = self.degrade("popular", self.provider.popular().await);
        entries.truncate(limit);
        entries
    }

    /// Title search; empty on no match or failure
    pub async fn search_by_title(&self, text: &str) -> Vec<CatalogEntry> {
        let result = self.try_search_by_title(text).await;
        self.degrade("search", result)
    }

    /// Title search that reports provider failures to the caller
    #[instrument(skip(self))]
    pub async fn try_search_by_title(&self, text: &str) -> AppResult<Vec<CatalogEntry>> {
        let entries = self.provider.search(text).await?;
        tracing::debug!(query = %text, results = entries.len(), "Catalog search completed");
        Ok(entries)
    }

    fn degrade(&self, operation: &str, result: AppResult<Vec<CatalogEntry>>) -> Vec<CatalogEntry> {
        result.unwrap_or_else(|e| {
            tracing::warn!(
                error = %e,
                operation,
                provider = self.provider.name(),
                "Catalog call failed, continuing with no results"
            );
            Vec::new()
        })
    }
}
