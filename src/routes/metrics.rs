use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Datelike, NaiveDate};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{parse_rows, InvoiceRow, LeaseRow, PaymentRow, PropertyRow, TenantRow},
    repository::table_service::list_all_rows,
    routes::support::{json_map, today_or},
    schemas::MetricsQuery,
    services::{
        invoice_balance::InvoiceStatus,
        metrics::{dashboard_metrics, profit_metrics, DashboardMetrics, ProfitMetrics},
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/metrics/dashboard", axum::routing::get(dashboard))
        .route("/metrics/profit", axum::routing::get(profit))
}

async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> AppResult<Json<DashboardMetrics>> {
    let as_of = today_or(query.as_of);
    let (month_start, month_end) = month_bounds(as_of)?;
    let pool = state.db_pool()?;

    let open_invoices = json_map(&[(
        "status",
        Value::String(InvoiceStatus::Open.as_str().to_string()),
    )]);
    let month_payments = json_map(&[
        ("payment_date__gte", json!(month_start)),
        ("payment_date__lte", json!(month_end)),
    ]);
    let (properties, leases, tenants, invoices, payments) = tokio::try_join!(
        list_all_rows(pool, "properties", None, "created_at", false),
        list_all_rows(pool, "leases", None, "created_at", false),
        list_all_rows(pool, "tenants", None, "created_at", false),
        list_all_rows(pool, "invoices", Some(&open_invoices), "due_date", false),
        list_all_rows(pool, "payments", Some(&month_payments), "payment_date", false),
    )?;

    Ok(Json(dashboard_metrics(
        as_of,
        &parse_rows::<PropertyRow>("properties", properties),
        &parse_rows::<LeaseRow>("leases", leases),
        &parse_rows::<TenantRow>("tenants", tenants),
        &parse_rows::<InvoiceRow>("invoices", invoices),
        &parse_rows::<PaymentRow>("payments", payments),
    )))
}

async fn profit(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> AppResult<Json<ProfitMetrics>> {
    let as_of = today_or(query.as_of);
    let pool = state.db_pool()?;

    let active = json_map(&[("status", Value::String("active".to_string()))]);
    let (properties, leases) = tokio::try_join!(
        list_all_rows(pool, "properties", None, "address", true),
        list_all_rows(pool, "leases", Some(&active), "created_at", false),
    )?;

    Ok(Json(profit_metrics(
        as_of,
        &parse_rows::<PropertyRow>("properties", properties),
        &parse_rows::<LeaseRow>("leases", leases),
    )))
}

/// First and last day of `date`'s calendar month.
fn month_bounds(date: NaiveDate) -> AppResult<(NaiveDate, NaiveDate)> {
    let start = date.with_day(1);
    let next = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    match (start, next.and_then(|next| next.pred_opt())) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(AppError::BadRequest("Date is out of range.".to_string())),
    }
}
