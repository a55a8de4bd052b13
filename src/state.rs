use sqlx::PgPool;

use crate::{config::AppConfig, db::build_pool, error::AppError};

/// Shared handler state. The pool is the single process-wide handle to the
/// external store; requests never keep their own connections.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, AppError> {
        let db_pool = build_pool(&config)?;
        if db_pool.is_none() {
            tracing::warn!("No DATABASE_URL configured; data endpoints will fail with 500");
        }
        Ok(Self { config, db_pool })
    }

    pub fn db_pool(&self) -> Result<&PgPool, AppError> {
        self.db_pool.as_ref().ok_or_else(|| {
            AppError::Dependency(
                "Database is not configured. Set DATABASE_URL.".to_string(),
            )
        })
    }
}

#[cfg(test)]
impl AppState {
    pub fn for_tests() -> Self {
        Self {
            config: AppConfig::for_tests(),
            db_pool: None,
        }
    }
}
