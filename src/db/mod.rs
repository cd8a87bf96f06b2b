mod error;
pub mod postgres;
pub mod repos;

#[cfg(test)]
pub mod tests;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};

use crate::config::{PostgresSslMode, ServiceConfig};

/// Cached repository trait objects, created once per pool.
struct CachedRepos {
    catalog: Arc<dyn CatalogRepo>,
    purge: Arc<dyn PurgeRepo>,
}

/// Connection pool for one service database.
pub struct DbPool {
    pool: sqlx::PgPool,
    repos: CachedRepos,
}

impl DbPool {
    /// Create a DbPool from an existing PostgreSQL pool.
    /// Primarily useful for testing.
    pub fn from_postgres(pool: sqlx::PgPool) -> Self {
        let repos = CachedRepos {
            catalog: Arc::new(postgres::PostgresCatalogRepo::new(pool.clone())),
            purge: Arc::new(postgres::PostgresPurgeRepo::new(pool.clone())),
        };
        Self { pool, repos }
    }

    /// Connect to the database of a configured service.
    pub async fn from_config(config: &ServiceConfig) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(connect_options(config)?)
            .await?;

        Ok(Self::from_postgres(pool))
    }

    pub fn catalog(&self) -> Arc<dyn CatalogRepo> {
        Arc::clone(&self.repos.catalog)
    }

    pub fn purge(&self) -> Arc<dyn PurgeRepo> {
        Arc::clone(&self.repos.purge)
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn connect_options(config: &ServiceConfig) -> DbResult<PgConnectOptions> {
    let mut options: PgConnectOptions = config.url.parse()?;
    options = options.ssl_mode(match config.ssl_mode {
        PostgresSslMode::Disable => PgSslMode::Disable,
        PostgresSslMode::Prefer => PgSslMode::Prefer,
        PostgresSslMode::Require => PgSslMode::Require,
        PostgresSslMode::VerifyCa => PgSslMode::VerifyCa,
        PostgresSslMode::VerifyFull => PgSslMode::VerifyFull,
    });
    if let Some(secs) = config.statement_timeout_secs {
        options = options.options([("statement_timeout", secs.saturating_mul(1000).to_string())]);
    }
    Ok(options)
}
