use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    Catalog, CatalogProvider, Explainer, PreferenceSource, Recommender, SimilarTitleResolver,
};

/// Shared application state
///
/// Built once at startup and read-only afterwards; every request gets a cheap
/// clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Catalog,
    pub recommender: Recommender,
    pub resolver: SimilarTitleResolver,
    pub explainer: Arc<Explainer>,
}

impl AppState {
    /// Wires the services around the given collaborators
    pub fn new(
        config: Config,
        preferences: Arc<dyn PreferenceSource>,
        catalog_provider: Arc<dyn CatalogProvider>,
        explainer: Explainer,
    ) -> Self {
        let catalog = Catalog::new(catalog_provider);
        let explainer = Arc::new(explainer);
        let recommender = Recommender::new(preferences, catalog.clone(), explainer.clone(), &config);
        let resolver = SimilarTitleResolver::new(catalog.clone(), &config);

        Self {
            config: Arc::new(config),
            catalog,
            recommender,
            resolver,
            explainer,
        }
    }
}
