//! User preference history, read from the playlist tables

use std::collections::HashSet;

use chrono::NaiveDateTime;
use sqlx::PgPool;

use crate::{error::AppResult, models::PreferenceItem};

/// Source of a user's movie history
///
/// Implementations return items ordered by `added_at`, newest first, with at
/// most one item per catalog id. An unknown user has an empty history.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PreferenceSource: Send + Sync {
    async fn history(&self, user_id: &str) -> AppResult<Vec<PreferenceItem>>;
}

/// Preference source backed by the community app's Postgres database
#[derive(Clone)]
pub struct PgPreferenceSource {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    movie_id: String,
    movie_title: String,
    movie_year: Option<i32>,
    added_at: NaiveDateTime,
}

impl From<HistoryRow> for PreferenceItem {
    fn from(row: HistoryRow) -> Self {
        PreferenceItem {
            catalog_id: row.movie_id,
            title: row.movie_title,
            year: row.movie_year.map(|y| y.to_string()),
            added_at: row.added_at.and_utc(),
        }
    }
}

impl PgPreferenceSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PreferenceSource for PgPreferenceSource {
    async fn history(&self, user_id: &str) -> AppResult<Vec<PreferenceItem>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT pm.movie_id, pm.movie_title, pm.movie_year, pm.added_at
            FROM playlist_movies pm
            JOIN playlists p ON pm.playlist_id = p.id
            WHERE p.user_id::text = $1
            ORDER BY pm.added_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let history = newest_per_movie(rows.into_iter().map(PreferenceItem::from));

        tracing::debug!(user_id = %user_id, items = history.len(), "Loaded user history");

        Ok(history)
    }
}

/// Keeps the first (newest) occurrence of each catalog id, preserving order
fn newest_per_movie(items: impl IntoIterator<Item = PreferenceItem>) -> Vec<PreferenceItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.catalog_id.clone()))
        .collect()
}
