use std::{str::FromStr, time::Duration};

use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};

use crate::{config::AppConfig, error::AppError};

/// Builds the pool lazily so startup never blocks on the network.
pub fn build_pool(config: &AppConfig) -> Result<Option<PgPool>, AppError> {
    let Some(url) = config.database_url.as_deref() else {
        return Ok(None);
    };

    let options = PgConnectOptions::from_str(url)
        .map_err(|error| AppError::Internal(format!("Invalid database URL: {error}")))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections.max(1))
        .min_connections(config.db_pool_min_connections)
        .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
        .connect_lazy_with(options);

    Ok(Some(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("Migration failed: {error}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    const INITIAL_SCHEMA: &str = include_str!("../migrations/20261017000000_initial_schema.sql");

    #[test]
    fn waivers_are_unique_per_invoice() {
        let waivers = INITIAL_SCHEMA
            .split("CREATE TABLE")
            .find(|table| table.contains("late_fee_waivers"))
            .expect("waiver table");
        assert!(waivers.contains("UNIQUE (invoice_id)"));
        assert!(!waivers.contains("UNIQUE (lease_id, due_date)"));
    }
}
