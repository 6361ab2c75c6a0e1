use sqlx::{postgres::PgPoolOptions, PgPool};

/// Creates a PostgreSQL connection pool for the playlist database
///
/// Connections are opened lazily on the first history query.
pub fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(database_url)?;

    Ok(pool)
}
