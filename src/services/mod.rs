pub mod catalog;
pub mod explanation;
pub mod preferences;
pub mod recommendations;
pub mod similar;

pub use catalog::{Catalog, CatalogProvider, TmdbProvider};
pub use explanation::Explainer;
pub use preferences::{PgPreferenceSource, PreferenceSource};
pub use recommendations::Recommender;
pub use similar::SimilarTitleResolver;
