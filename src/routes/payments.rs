use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    models::same_id,
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    routes::support::{json_map, non_empty_opt, value_str},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreatePaymentInput,
        PaymentPath, PaymentsQuery, PeriodQuery, PropertyPath, UpdatePaymentInput,
    },
    services::{
        currency::{round_cents, safe_numeric, to_usd_no_symbol},
        ledger,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/payments",
            axum::routing::get(list_payments).post(create_payment),
        )
        .route(
            "/payments/by-period",
            axum::routing::get(list_payments_by_period),
        )
        .route(
            "/payments/by-property/{property_id}",
            axum::routing::get(list_payments_by_property),
        )
        .route(
            "/payments/{payment_id}",
            axum::routing::get(get_payment)
                .patch(update_payment)
                .delete(delete_payment),
        )
}

async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentsQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;

    let mut filters = Map::new();
    for (key, value) in [
        ("lease_id", &query.lease_id),
        ("property_id", &query.property_id),
        ("invoice_id", &query.invoice_id),
    ] {
        if let Some(value) = non_empty_opt(value.as_deref()) {
            filters.insert(key.to_string(), Value::String(value));
        }
    }

    let rows = list_rows(
        pool,
        "payments",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "payment_date",
        false,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

/// Payments dated within `[from, to]`, oldest first.
async fn list_payments_by_period(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> AppResult<Json<Value>> {
    if query.to < query.from {
        return Err(AppError::BadRequest(
            "to must be on or after from.".to_string(),
        ));
    }
    let filters = json_map(&[
        ("payment_date__gte", json!(query.from)),
        ("payment_date__lte", json!(query.to)),
    ]);

    let pool = state.db_pool()?;
    let rows = list_rows(
        pool,
        "payments",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 5000),
        0,
        "payment_date",
        true,
    )
    .await?;
    let total = rows
        .iter()
        .map(|row| safe_numeric(row.get("amount")))
        .sum::<f64>();
    Ok(Json(json!({
        "from": query.from,
        "to": query.to,
        "total_amount": round_cents(total),
        "total_amount_display": to_usd_no_symbol(total),
        "data": rows,
    })))
}

async fn list_payments_by_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    let filters = json_map(&[("property_id", Value::String(path.property_id.clone()))]);
    let rows = list_rows(pool, "payments", Some(&filters), 1000, 0, "payment_date", false).await?;
    Ok(Json(json!({ "data": rows })))
}

/// Records a payment. Property and tenant default to the lease's; a linked
/// invoice must belong to the same lease and has the amount applied to it.
async fn create_payment(
    State(state): State<AppState>,
    Json(payload): Json<CreatePaymentInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let mut record = remove_nulls(serialize_to_map(&payload));
    let invoice_id = non_empty_opt(payload.invoice_id.as_deref());

    let pool = state.db_pool()?;
    let lease = get_row(pool, "leases", &payload.lease_id, "id").await?;
    for key in ["property_id", "tenant_id"] {
        if !record.contains_key(key) {
            let value = value_str(&lease, key);
            if !value.is_empty() {
                record.insert(key.to_string(), Value::String(value));
            }
        }
    }
    if let Some(invoice_id) = invoice_id.as_deref() {
        let invoice = get_row(pool, "invoices", invoice_id, "id").await?;
        if !same_id(&value_str(&invoice, "lease_id"), &payload.lease_id) {
            return Err(AppError::BadRequest(
                "Invoice does not belong to this lease.".to_string(),
            ));
        }
    }

    let created = create_row(pool, "payments", &record).await?;
    let invoice = match invoice_id.as_deref() {
        Some(invoice_id) => Some(ledger::apply_payment(pool, invoice_id, payload.amount).await?),
        None => None,
    };

    tracing::info!(
        payment_id = %value_str(&created, "id"),
        lease_id = %payload.lease_id,
        amount = payload.amount,
        "Payment recorded"
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "payment": created, "invoice": invoice })),
    ))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    Ok(Json(get_row(pool, "payments", &path.payment_id, "id").await?))
}

/// A changed amount moves the linked invoice's paid total by the difference.
async fn update_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    Json(payload): Json<UpdatePaymentInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let patch = remove_nulls(serialize_to_map(&payload));

    let pool = state.db_pool()?;
    let current = get_row(pool, "payments", &path.payment_id, "id").await?;
    let updated = update_row(pool, "payments", &path.payment_id, &patch, "id").await?;

    let invoice_id = value_str(&current, "invoice_id");
    let delta = payload
        .amount
        .map(|amount| amount - safe_numeric(current.get("amount")))
        .unwrap_or(0.0);
    let invoice = if invoice_id.is_empty() || delta == 0.0 {
        None
    } else {
        Some(ledger::apply_payment(pool, &invoice_id, delta).await?)
    };

    Ok(Json(json!({ "payment": updated, "invoice": invoice })))
}

/// Deleting a linked payment takes its amount back off the invoice.
async fn delete_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    let deleted = delete_row(pool, "payments", &path.payment_id, "id").await?;

    let invoice_id = value_str(&deleted, "invoice_id");
    let invoice = if invoice_id.is_empty() {
        None
    } else {
        let amount = safe_numeric(deleted.get("amount"));
        Some(ledger::apply_payment(pool, &invoice_id, -amount).await?)
    };

    tracing::info!(payment_id = %path.payment_id, "Payment deleted");
    Ok(Json(json!({ "payment": deleted, "invoice": invoice })))
}
