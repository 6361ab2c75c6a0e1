use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A movie from the user's playlists, newest first when returned by a
/// preference source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceItem {
    pub catalog_id: String,
    pub title: String,
    pub year: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// A catalog movie as seen by the recommendation core
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub catalog_id: String,
    pub title: String,
    pub release_year: Option<String>,
    /// Provider-relative poster path, e.g. "/abc.jpg"
    pub poster_path: Option<String>,
    /// Provider rating, 0-10 for TMDB
    pub quality_score: f64,
}

impl CatalogEntry {
    /// Absolute poster URL, or None when the provider supplied no path
    pub fn poster_url(&self, image_base_url: &str) -> Option<String> {
        self.poster_path.as_deref().map(|path| {
            let base = image_base_url.trim_end_matches('/');
            if path.starts_with('/') {
                format!("{}{}", base, path)
            } else {
                format!("{}/{}", base, path)
            }
        })
    }

    /// Turns this entry into a scored candidate carrying `reason`
    pub fn into_candidate(self, image_base_url: &str, reason: impl Into<String>) -> Candidate {
        let poster_url = self.poster_url(image_base_url);
        Candidate {
            catalog_id: self.catalog_id,
            title: self.title,
            year: self.release_year,
            poster_url,
            score: self.quality_score,
            reason: reason.into(),
        }
    }
}

/// A deduplicated, scored and explained recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(rename = "movieId")]
    pub catalog_id: String,
    pub title: String,
    pub year: Option<String>,
    pub poster_url: Option<String>,
    pub score: f64,
    pub reason: String,
}

/// The catalog entry a free-text title resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedMovie {
    pub id: String,
    pub title: String,
    pub year: Option<String>,
    pub poster_url: Option<String>,
}

impl MatchedMovie {
    pub fn from_entry(entry: &CatalogEntry, image_base_url: &str) -> Self {
        Self {
            id: entry.catalog_id.clone(),
            title: entry.title.clone(),
            year: entry.release_year.clone(),
            poster_url: entry.poster_url(image_base_url),
        }
    }
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// Movie object as returned by TMDB detail and list endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
}

/// Paged list response (`/movie/popular`, `/movie/{id}/similar`, `/search/movie`)
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage {
    #[serde(default)]
    pub results: Vec<TmdbMovie>,
}

impl From<TmdbMovie> for CatalogEntry {
    fn from(movie: TmdbMovie) -> Self {
        let release_year = movie
            .release_date
            .as_deref()
            .filter(|date| !date.is_empty())
            .map(|date| date.chars().take(4).collect());

        CatalogEntry {
            catalog_id: movie.id.to_string(),
            title: movie.title,
            release_year,
            poster_path: movie.poster_path.filter(|p| !p.is_empty()),
            quality_score: movie.vote_average.unwrap_or(0.0),
        }
    }
}
