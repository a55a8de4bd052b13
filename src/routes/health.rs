use std::time::Duration;

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

const DB_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Liveness plus a bounded database check. Always answers 200; the body says
/// whether the store is reachable.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match &state.db_pool {
        Some(pool) => {
            match tokio::time::timeout(DB_PROBE_TIMEOUT, sqlx::query("SELECT 1").fetch_one(pool))
                .await
            {
                Ok(Ok(_)) => "ok",
                Ok(Err(error)) => {
                    tracing::error!(error = %error, "Health check DB query failed");
                    "unreachable"
                }
                Err(_) => {
                    tracing::error!("Health check DB query timed out");
                    "timeout"
                }
            }
        }
        None => "not_configured",
    };

    let status = if matches!(database, "ok" | "not_configured") {
        "ok"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "app": state.config.app_name,
        "environment": state.config.environment,
        "database": database,
        "now": Utc::now().to_rfc3339(),
    }))
}
