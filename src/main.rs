use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use movie_rec_service::{
    api::{create_router, AppState},
    config::Config,
    db::create_pool,
    services::{Explainer, PgPreferenceSource, TmdbProvider},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(service = %config.service_name, "Starting recommendation service");

    if config.tmdb_api_key.is_empty() {
        tracing::warn!("TMDB_API_KEY is not set, catalog calls will fail");
    }

    let pool = create_pool(&config.database_url)?;
    let preferences = Arc::new(PgPreferenceSource::new(pool));
    let catalog = Arc::new(TmdbProvider::new(&config)?);

    // Chosen once; never re-checked per request
    let explainer = Explainer::detect(&config).await;
    tracing::info!(llm_enabled = explainer.is_generative(), "Explanation generator selected");

    let addr = config.bind_addr();
    let state = AppState::new(config, preferences, catalog, explainer);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
