use std::collections::HashSet;
use std::sync::Arc;

use tracing::instrument;

use crate::{
    config::Config,
    error::AppResult,
    models::{Candidate, CatalogEntry, PreferenceItem},
    services::{
        catalog::Catalog,
        explanation::{deterministic_reason, Explainer},
        preferences::PreferenceSource,
    },
};

/// Reason attached to every cold-start recommendation
pub const TRENDING_REASON: &str = "Trending now - popular with movie lovers";
pub const DEFAULT_LIMIT: usize = 10;

/// Most recent history items used as seeds
const SEED_COUNT: usize = 5;
/// Similar movies requested per seed
const SIMILAR_PER_SEED: usize = 5;
/// History titles handed to the explainer
const EXPLANATION_TITLES: usize = 3;

/// Candidates keyed by catalog id, kept in first-seen order
///
/// Inserting an id that is already present is a no-op: the first candidate
/// recorded for an id keeps its score and reason.
#[derive(Debug, Default)]
struct CandidateSet {
    ids: HashSet<String>,
    ordered: Vec<Candidate>,
}

impl CandidateSet {
    fn contains(&self, catalog_id: &str) -> bool {
        self.ids.contains(catalog_id)
    }

    /// Returns false when the id was already present
    fn insert(&mut self, candidate: Candidate) -> bool {
        if !self.ids.insert(candidate.catalog_id.clone()) {
            return false;
        }
        self.ordered.push(candidate);
        true
    }

    /// Highest score first; equal scores stay in first-seen order
    fn into_ranked(mut self, limit: usize) -> Vec<Candidate> {
        self.ordered.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.ordered.truncate(limit);
        self.ordered
    }
}

/// Personalized movie recommendations
///
/// Seeds the catalog's similarity lookups with the user's most recent
/// history, drops anything the user already has, keeps the first discovery
/// of each movie and ranks by catalog score. Users without history get the
/// catalog's popular list instead.
#[derive(Clone)]
pub struct Recommender {
    preferences: Arc<dyn PreferenceSource>,
    catalog: Catalog,
    explainer: Arc<Explainer>,
    image_base_url: String,
}

impl Recommender {
    pub fn new(
        preferences: Arc<dyn PreferenceSource>,
        catalog: Catalog,
        explainer: Arc<Explainer>,
        config: &Config,
    ) -> Self {
        Self {
            preferences,
            catalog,
            explainer,
            image_base_url: config.tmdb_image_base_url.clone(),
        }
    }

    /// Up to `limit` recommendations for `user_id`
    ///
    /// Fails only when the user's history cannot be read. Catalog failures
    /// shrink the result instead.
    #[instrument(skip(self))]
    pub async fn recommend(&self, user_id: &str, limit: usize) -> AppResult<Vec<Candidate>> {
        let history = self.preferences.history(user_id).await?;

        if history.is_empty() {
            tracing::info!(user_id = %user_id, "No history, serving trending movies");
            return Ok(self.trending(limit).await);
        }

        let seen: HashSet<&str> = history.iter().map(|item| item.catalog_id.as_str()).collect();
        let history_titles: Vec<String> = history
            .iter()
            .take(EXPLANATION_TITLES)
            .map(|item| item.title.clone())
            .collect();

        let seeds = &history[..history.len().min(SEED_COUNT)];
        let batches = self.similar_for_seeds(seeds).await;

        let mut candidates = CandidateSet::default();
        for entry in batches.into_iter().flatten() {
            if seen.contains(entry.catalog_id.as_str()) || candidates.contains(&entry.catalog_id) {
                continue;
            }
            candidates.insert(entry.into_candidate(&self.image_base_url, String::new()));
        }

        let mut ranked = candidates.into_ranked(limit);
        self.explain_all(history_titles, &mut ranked).await;

        tracing::info!(
            user_id = %user_id,
            history = history.len(),
            seeds = seeds.len(),
            returned = ranked.len(),
            "Recommendations generated"
        );

        Ok(ranked)
    }

    async fn trending(&self, limit: usize) -> Vec<Candidate> {
        self.catalog
            .fetch_popular(limit)
            .await
            .into_iter()
            .map(|entry| entry.into_candidate(&self.image_base_url, TRENDING_REASON))
            .collect()
    }

    /// Explains every candidate concurrently
    ///
    /// Reasons are written back in candidate order. A candidate whose task
    /// failed gets the deterministic reason.
    async fn explain_all(&self, history_titles: Vec<String>, candidates: &mut [Candidate]) {
        let history_titles = Arc::new(history_titles);
        let tasks: Vec<_> = candidates
            .iter()
            .map(|candidate| {
                let explainer = Arc::clone(&self.explainer);
                let history_titles = Arc::clone(&history_titles);
                let title = candidate.title.clone();
                tokio::spawn(async move { explainer.explain(&history_titles, &title).await })
            })
            .collect();

        for (candidate, task) in candidates.iter_mut().zip(tasks) {
            candidate.reason = match task.await {
                Ok(reason) => reason,
                Err(e) => {
                    tracing::error!(error = %e, movie_id = %candidate.catalog_id, "Explanation task failed");
                    deterministic_reason(&history_titles)
                }
            };
        }
    }

    /// Fetches similar movies for every seed concurrently
    ///
    /// Batches come back in seed order regardless of which request finished
    /// first. A seed whose task failed contributes an empty batch.
    async fn similar_for_seeds(&self, seeds: &[PreferenceItem]) -> Vec<Vec<CatalogEntry>> {
        let tasks: Vec<_> = seeds
            .iter()
            .map(|seed| {
                let catalog = self.catalog.clone();
                let seed_id = seed.catalog_id.clone();
                tokio::spawn(async move { catalog.fetch_similar(&seed_id, SIMILAR_PER_SEED).await })
            })
            .collect();

        let mut batches = Vec::with_capacity(tasks.len());
        for (seed, task) in seeds.iter().zip(tasks) {
            match task.await {
                Ok(entries) => batches.push(entries),
                Err(e) => {
                    tracing::error!(error = %e, seed_id = %seed.catalog_id, "Similar lookup task failed");
                    batches.push(Vec::new());
                }
            }
        }

        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::catalog::test_support::entry;
    use crate::services::catalog::MockCatalogProvider;
    use crate::services::catalog::CatalogProvider;
    use crate::services::explanation::{GenerationError, MockTextGenerator, TextGenerator};
    use crate::services::preferences::MockPreferenceSource;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers the newest seed last, after the older seed has completed
    #[derive(Default)]
    struct StaggeredCatalog {
        completed: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl CatalogProvider for StaggeredCatalog {
        async fn movie(&self, id: &str) -> AppResult<CatalogEntry> {
            Err(AppError::NotFound(id.to_string()))
        }

        async fn similar(&self, id: &str) -> AppResult<Vec<CatalogEntry>> {
            let score = if id == "newest" {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                9.0
            } else {
                1.0
            };
            self.completed.lock().unwrap().push(id.to_string());
            Ok(vec![entry("shared", "Shared", score)])
        }

        async fn popular(&self) -> AppResult<Vec<CatalogEntry>> {
            Ok(Vec::new())
        }

        async fn search(&self, _query: &str) -> AppResult<Vec<CatalogEntry>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "staggered"
        }
    }

    /// Echoes the candidate title and tracks how many calls overlap
    #[derive(Default)]
    struct OverlapGenerator {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TextGenerator for OverlapGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let title = prompt
                .split("enjoy: ")
                .nth(1)
                .and_then(|rest| rest.lines().next())
                .unwrap_or_default();
            Ok(format!("Because {} fits", title))
        }
    }

    fn history(items: &[(&str, &str)]) -> Vec<PreferenceItem> {
        let newest = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        items
            .iter()
            .enumerate()
            .map(|(i, (id, title))| PreferenceItem {
                catalog_id: id.to_string(),
                title: title.to_string(),
                year: None,
                added_at: newest - Duration::days(i as i64),
            })
            .collect()
    }

    fn preferences(items: Vec<PreferenceItem>) -> Arc<dyn PreferenceSource> {
        let mut mock = MockPreferenceSource::new();
        mock.expect_history().returning(move |_| Ok(items.clone()));
        Arc::new(mock)
    }

    fn catalog_mock() -> MockCatalogProvider {
        let mut mock = MockCatalogProvider::new();
        mock.expect_name().return_const("mock");
        mock
    }

    fn recommender(
        preferences: Arc<dyn PreferenceSource>,
        catalog: MockCatalogProvider,
        explainer: Explainer,
    ) -> Recommender {
        Recommender::new(
            preferences,
            Catalog::new(Arc::new(catalog)),
            Arc::new(explainer),
            &Config::default(),
        )
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.catalog_id.as_str()).collect()
    }

    #[test]
    fn test_candidate_set_first_seen_wins() {
        let mut set = CandidateSet::default();
        assert!(set.insert(entry("1", "Heat", 7.0).into_candidate("", "first")));
        assert!(!set.insert(entry("1", "Heat", 9.9).into_candidate("", "second")));

        let ranked = set.into_ranked(10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 7.0);
        assert_eq!(ranked[0].reason, "first");
    }

    #[test]
    fn test_candidate_set_ranking_is_stable() {
        let mut set = CandidateSet::default();
        set.insert(entry("a", "A", 6.0).into_candidate("", ""));
        set.insert(entry("b", "B", 8.0).into_candidate("", ""));
        set.insert(entry("c", "C", 6.0).into_candidate("", ""));
        set.insert(entry("d", "D", 8.0).into_candidate("", ""));

        assert_eq!(ids(&set.into_ranked(3)), vec!["b", "d", "a"]);
    }

    #[tokio::test]
    async fn test_cold_start_serves_trending() {
        let mut catalog = catalog_mock();
        catalog.expect_popular().times(1).returning(|| {
            Ok(vec![
                entry("10", "Dune", 8.0),
                entry("11", "Oppenheimer", 8.2),
                entry("12", "Barbie", 7.1),
            ])
        });
        catalog.expect_similar().never();

        let mut generator = MockTextGenerator::new();
        generator.expect_generate().never();

        let recommender = recommender(
            preferences(Vec::new()),
            catalog,
            Explainer::Generative(Arc::new(generator)),
        );
        let candidates = recommender.recommend("new-user", 2).await.unwrap();

        assert_eq!(ids(&candidates), vec!["10", "11"]);
        assert!(candidates.iter().all(|c| c.reason == TRENDING_REASON));
        assert_eq!(candidates[1].score, 8.2);
    }

    #[tokio::test]
    async fn test_single_seed_single_candidate() {
        let mut catalog = catalog_mock();
        catalog
            .expect_similar()
            .withf(|id| id == "5")
            .returning(|_| Ok(vec![entry("99", "Memento", 8.1)]));

        let recommender = recommender(
            preferences(history(&[("5", "Inception")])),
            catalog,
            Explainer::Deterministic,
        );
        let candidates = recommender.recommend("u1", DEFAULT_LIMIT).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].catalog_id, "99");
        assert_eq!(candidates[0].score, 8.1);
        assert_eq!(candidates[0].reason, "Recommended because you enjoyed Inception");
    }

    #[tokio::test]
    async fn test_seen_movies_are_excluded_and_first_seen_wins() {
        let mut catalog = catalog_mock();
        catalog.expect_similar().returning(|id| match id {
            "a" => Ok(vec![entry("x", "X", 7.0), entry("b", "B", 9.5)]),
            "b" => Ok(vec![entry("x", "X", 9.0), entry("y", "Y", 7.0), entry("a", "A", 9.9)]),
            _ => Ok(Vec::new()),
        });

        let recommender = recommender(
            preferences(history(&[("a", "Alpha"), ("b", "Beta")])),
            catalog,
            Explainer::Deterministic,
        );
        let candidates = recommender.recommend("u1", DEFAULT_LIMIT).await.unwrap();

        assert_eq!(ids(&candidates), vec!["x", "y"]);
        assert_eq!(candidates[0].score, 7.0);
    }

    #[tokio::test]
    async fn test_output_sorted_by_score_descending() {
        let mut catalog = catalog_mock();
        catalog.expect_similar().returning(|_| {
            Ok(vec![
                entry("1", "One", 5.5),
                entry("2", "Two", 9.1),
                entry("3", "Three", 7.3),
            ])
        });

        let recommender = recommender(
            preferences(history(&[("s", "Seed")])),
            catalog,
            Explainer::Deterministic,
        );
        let candidates = recommender.recommend("u1", DEFAULT_LIMIT).await.unwrap();

        assert_eq!(ids(&candidates), vec!["2", "3", "1"]);
    }

    #[tokio::test]
    async fn test_only_five_most_recent_seeds_are_queried() {
        let mut catalog = catalog_mock();
        catalog
            .expect_similar()
            .withf(|id| !matches!(id, "old1" | "old2"))
            .times(5)
            .returning(|id| Ok(vec![entry(&format!("rec-{}", id), "Rec", 6.0)]));

        let recommender = recommender(
            preferences(history(&[
                ("n1", "N1"),
                ("n2", "N2"),
                ("n3", "N3"),
                ("n4", "N4"),
                ("n5", "N5"),
                ("old1", "Old1"),
                ("old2", "Old2"),
            ])),
            catalog,
            Explainer::Deterministic,
        );
        let candidates = recommender.recommend("u1", DEFAULT_LIMIT).await.unwrap();

        // equal scores keep seed recency order
        assert_eq!(
            ids(&candidates),
            vec!["rec-n1", "rec-n2", "rec-n3", "rec-n4", "rec-n5"]
        );
    }

    #[tokio::test]
    async fn test_failed_seed_degrades_to_partial_results() {
        let mut catalog = catalog_mock();
        catalog.expect_similar().returning(|id| match id {
            "a" => Err(AppError::UpstreamUnavailable("timeout".to_string())),
            _ => Ok(vec![entry("z", "Zodiac", 7.7)]),
        });

        let recommender = recommender(
            preferences(history(&[("a", "Alien"), ("b", "Blade Runner")])),
            catalog,
            Explainer::Deterministic,
        );
        let candidates = recommender.recommend("u1", DEFAULT_LIMIT).await.unwrap();

        assert_eq!(ids(&candidates), vec!["z"]);
    }

    #[tokio::test]
    async fn test_history_failure_is_fatal() {
        let mut prefs = MockPreferenceSource::new();
        prefs
            .expect_history()
            .returning(|_| Err(AppError::Internal("connection refused".to_string())));

        let recommender = recommender(Arc::new(prefs), catalog_mock(), Explainer::Deterministic);
        assert!(recommender.recommend("u1", DEFAULT_LIMIT).await.is_err());
    }

    #[tokio::test]
    async fn test_generation_failure_uses_fallback_reason() {
        let mut catalog = catalog_mock();
        catalog
            .expect_similar()
            .returning(|_| Ok(vec![entry("99", "Memento", 8.1)]));

        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_| Err(GenerationError::EmptyOutput));

        let recommender = recommender(
            preferences(history(&[("5", "Inception"), ("6", "Heat")])),
            catalog,
            Explainer::Generative(Arc::new(generator)),
        );
        let candidates = recommender.recommend("u1", DEFAULT_LIMIT).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].reason, "Recommended because you enjoyed Inception");
    }

    #[tokio::test]
    async fn test_repeated_requests_are_identical() {
        let mut catalog = catalog_mock();
        catalog.expect_similar().returning(|id| {
            Ok(vec![
                entry(&format!("{}-1", id), "One", 7.0),
                entry("shared", "Shared", 7.0),
            ])
        });

        let recommender = recommender(
            preferences(history(&[("a", "A"), ("b", "B"), ("c", "C")])),
            catalog,
            Explainer::Deterministic,
        );

        let first = recommender.recommend("u1", DEFAULT_LIMIT).await.unwrap();
        let second = recommender.recommend("u1", DEFAULT_LIMIT).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(ids(&first), vec!["a-1", "shared", "b-1", "c-1"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_seed_order_beats_completion_order() {
        let provider = Arc::new(StaggeredCatalog::default());
        let catalog: Arc<dyn CatalogProvider> = provider.clone();

        let recommender = Recommender::new(
            preferences(history(&[("newest", "Newest"), ("older", "Older")])),
            Catalog::new(catalog),
            Arc::new(Explainer::Deterministic),
            &Config::default(),
        );
        let candidates = recommender.recommend("u1", DEFAULT_LIMIT).await.unwrap();

        assert_eq!(*provider.completed.lock().unwrap(), vec!["older", "newest"]);
        let ranked: Vec<(&str, f64)> = candidates
            .iter()
            .map(|c| (c.catalog_id.as_str(), c.score))
            .collect();
        assert_eq!(ranked, vec![("shared", 9.0)]);
    }

    #[tokio::test]
    async fn test_explanations_run_concurrently_in_rank_order() {
        let mut catalog = catalog_mock();
        catalog.expect_similar().returning(|_| {
            Ok(vec![
                entry("1", "Alien", 6.0),
                entry("2", "Heat", 9.0),
                entry("3", "Ronin", 7.5),
            ])
        });

        let generator = Arc::new(OverlapGenerator::default());
        let shared: Arc<dyn TextGenerator> = generator.clone();

        let recommender = recommender(
            preferences(history(&[("s", "Seed")])),
            catalog,
            Explainer::Generative(shared),
        );
        let candidates = recommender.recommend("u1", DEFAULT_LIMIT).await.unwrap();

        assert_eq!(ids(&candidates), vec!["2", "3", "1"]);
        let reasons: Vec<&str> = candidates.iter().map(|c| c.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec!["Because Heat fits", "Because Ronin fits", "Because Alien fits"]
        );
        assert!(generator.peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_only_returned_candidates_are_explained() {
        let mut catalog = catalog_mock();
        catalog.expect_similar().returning(|_| {
            Ok(vec![
                entry("1", "Alien", 6.0),
                entry("2", "Heat", 9.0),
                entry("3", "Ronin", 7.5),
            ])
        });

        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_| Ok("A tense crime epic".to_string()));

        let recommender = recommender(
            preferences(history(&[("s", "Seed")])),
            catalog,
            Explainer::Generative(Arc::new(generator)),
        );
        let candidates = recommender.recommend("u1", 1).await.unwrap();

        assert_eq!(ids(&candidates), vec!["2"]);
        assert_eq!(candidates[0].reason, "A tense crime epic");
    }
}
