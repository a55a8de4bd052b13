use axum::{routing::get, Router};

use crate::state::AppState;

pub mod health;
pub mod invoices;
pub mod late_fees;
pub mod leases;
pub mod metrics;
pub mod payments;
pub mod properties;
pub mod reports;
pub mod support;
pub mod tenants;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(properties::router())
        .merge(tenants::router())
        .merge(leases::router())
        .merge(invoices::router())
        .merge(payments::router())
        .merge(late_fees::router())
        .merge(reports::router())
        .merge(metrics::router())
}
