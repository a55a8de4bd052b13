use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    models::{parse_rows, InvoiceRow, LeaseRow, PaymentRow, PropertyRow, TenantRow},
    repository::table_service::list_all_rows,
    routes::support::{
        extract_ids, id_array, json_map, property_labels, rows_in, tenant_names, today_or,
    },
    schemas::LateTenantsQuery,
    services::{
        invoice_balance::InvoiceStatus,
        late_tenants::{aggregate_late_tenants, LateTenantInput, LateTenantReport},
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/reports/late-tenants",
        axum::routing::get(late_tenants_report),
    )
}

/// Active leases, their open invoices and their payments come from three
/// batched reads; labels from two more. Each read pages until exhausted so
/// totals cover the whole portfolio. Aggregation is done in memory.
async fn late_tenants_report(
    State(state): State<AppState>,
    Query(query): Query<LateTenantsQuery>,
) -> AppResult<Json<LateTenantReport>> {
    let today = today_or(query.today);
    let pool = state.db_pool()?;

    let lease_filters = json_map(&[("status", Value::String("active".to_string()))]);
    let leases =
        list_all_rows(pool, "leases", Some(&lease_filters), "created_at", false).await?;

    let lease_ids = extract_ids(&leases, "id");
    let tenant_ids = extract_ids(&leases, "tenant_id");
    let property_ids = extract_ids(&leases, "property_id");

    let invoice_filters = json_map(&[
        ("lease_id__in", id_array(&lease_ids)),
        (
            "status",
            Value::String(InvoiceStatus::Open.as_str().to_string()),
        ),
        ("balance_due__gt", json!(0)),
        ("due_date__lte", json!(today)),
    ]);
    let payment_filters = json_map(&[
        ("lease_id__in", id_array(&lease_ids)),
        ("payment_date__lte", json!(today)),
    ]);

    let (invoices, payments, tenants, properties) = if lease_ids.is_empty() {
        Default::default()
    } else {
        tokio::try_join!(
            list_all_rows(pool, "invoices", Some(&invoice_filters), "due_date", true),
            list_all_rows(pool, "payments", Some(&payment_filters), "payment_date", false),
            rows_in(pool, "tenants", "id", &tenant_ids),
            rows_in(pool, "properties", "id", &property_ids),
        )?
    };

    let leases: Vec<LeaseRow> = parse_rows("leases", leases);
    let invoices: Vec<InvoiceRow> = parse_rows("invoices", invoices);
    let payments: Vec<PaymentRow> = parse_rows("payments", payments);
    let tenant_names = tenant_names(&parse_rows::<TenantRow>("tenants", tenants));
    let property_labels = property_labels(&parse_rows::<PropertyRow>("properties", properties));

    let report = aggregate_late_tenants(
        today,
        state.config.late_report_severe_days,
        &LateTenantInput {
            leases: &leases,
            invoices: &invoices,
            payments: &payments,
            tenant_names: &tenant_names,
            property_labels: &property_labels,
        },
    );
    tracing::info!(
        as_of = %today,
        late_leases = report.summary.late_lease_count,
        "Late-tenant report built"
    );
    Ok(Json(report))
}
