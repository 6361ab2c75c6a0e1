use tracing::instrument;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{Candidate, CatalogEntry},
    services::catalog::Catalog,
};

pub const DEFAULT_SIMILAR_LIMIT: usize = 5;

/// Outcome of resolving a free-text title
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarTitles {
    pub found: bool,
    pub matched: Option<CatalogEntry>,
    pub candidates: Vec<Candidate>,
}

impl SimilarTitles {
    fn not_found() -> Self {
        Self {
            found: false,
            matched: None,
            candidates: Vec::new(),
        }
    }
}

/// Resolves a title to a catalog movie and lists movies similar to it
#[derive(Clone)]
pub struct SimilarTitleResolver {
    catalog: Catalog,
    image_base_url: String,
}

impl SimilarTitleResolver {
    pub fn new(catalog: Catalog, config: &Config) -> Self {
        Self {
            catalog,
            image_base_url: config.tmdb_image_base_url.clone(),
        }
    }

    pub fn image_base_url(&self) -> &str {
        &self.image_base_url
    }

    /// The provider's top search hit is taken as the match. A failed search
    /// is an error; an empty one is `found: false`.
    #[instrument(skip(self))]
    pub async fn find_similar_by_title(&self, text: &str, limit: usize) -> AppResult<SimilarTitles> {
        let results = self.catalog.try_search_by_title(text).await.map_err(|e| {
            tracing::error!(error = %e, title = %text, "Movie search failed");
            AppError::UpstreamUnavailable(format!("Failed to search for movie: {}", e))
        })?;

        let Some(matched) = results.into_iter().next() else {
            tracing::info!(title = %text, "No catalog match for title");
            return Ok(SimilarTitles::not_found());
        };

        let reason = format!("Similar to {}", matched.title);
        let candidates: Vec<Candidate> = self
            .catalog
            .fetch_similar(&matched.catalog_id, limit)
            .await
            .into_iter()
            .map(|entry| entry.into_candidate(&self.image_base_url, reason.as_str()))
            .collect();

        tracing::info!(
            title = %text,
            matched_id = %matched.catalog_id,
            returned = candidates.len(),
            "Similar titles resolved"
        );

        Ok(SimilarTitles {
            found: true,
            matched: Some(matched),
            candidates,
        })
    }
}
