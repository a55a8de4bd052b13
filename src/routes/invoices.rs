use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    repository::table_service::{delete_row, get_row, list_rows},
    routes::support::non_empty_opt,
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreateInvoiceInput,
        InvoicePath, InvoicesQuery, PeriodQuery, UpdateInvoiceInput,
    },
    services::{invoice_balance::InvoiceStatus, ledger},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/invoices",
            axum::routing::get(list_invoices).post(create_invoice),
        )
        .route(
            "/invoices/by-period",
            axum::routing::get(list_invoices_by_period),
        )
        .route(
            "/invoices/{invoice_id}",
            axum::routing::get(get_invoice)
                .patch(update_invoice)
                .delete(delete_invoice),
        )
        .route(
            "/invoices/{invoice_id}/void",
            axum::routing::post(void_invoice),
        )
}

async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<InvoicesQuery>,
) -> AppResult<Json<Value>> {
    let mut filters = Map::new();
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        let status = InvoiceStatus::parse(&status).ok_or_else(|| {
            AppError::BadRequest("status must be OPEN, PAID or VOID.".to_string())
        })?;
        filters.insert(
            "status".to_string(),
            Value::String(status.as_str().to_string()),
        );
    }
    if let Some(lease_id) = non_empty_opt(query.lease_id.as_deref()) {
        filters.insert("lease_id".to_string(), Value::String(lease_id));
    }
    if let Some(due_from) = query.due_from {
        filters.insert("due_date__gte".to_string(), json!(due_from));
    }
    if let Some(due_to) = query.due_to {
        filters.insert("due_date__lte".to_string(), json!(due_to));
    }

    let pool = state.db_pool()?;
    let rows = list_rows(
        pool,
        "invoice_details",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "due_date",
        false,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

/// Invoices whose service period overlaps `[from, to]`.
async fn list_invoices_by_period(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> AppResult<Json<Value>> {
    if query.to < query.from {
        return Err(AppError::BadRequest(
            "to must be on or after from.".to_string(),
        ));
    }
    let mut filters = Map::new();
    filters.insert("period_start__lte".to_string(), json!(query.to));
    filters.insert("period_end__gte".to_string(), json!(query.from));

    let pool = state.db_pool()?;
    let rows = list_rows(
        pool,
        "invoice_details",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 5000),
        0,
        "period_start",
        true,
    )
    .await?;
    Ok(Json(json!({
        "from": query.from,
        "to": query.to,
        "data": rows,
    })))
}

async fn create_invoice(
    State(state): State<AppState>,
    Json(payload): Json<CreateInvoiceInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    if let (Some(start), Some(end)) = (payload.period_start, payload.period_end) {
        if end < start {
            return Err(AppError::BadRequest(
                "period_end must be on or after period_start.".to_string(),
            ));
        }
    }
    let record = remove_nulls(serialize_to_map(&payload));

    let pool = state.db_pool()?;
    get_row(pool, "leases", &payload.lease_id, "id").await?;
    let created = ledger::create_invoice(pool, record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    Ok(Json(
        get_row(pool, "invoice_details", &path.invoice_id, "id").await?,
    ))
}

async fn update_invoice(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
    Json(payload): Json<UpdateInvoiceInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let patch = remove_nulls(serialize_to_map(&payload));

    let pool = state.db_pool()?;
    let updated = ledger::update_invoice(pool, &path.invoice_id, patch).await?;
    Ok(Json(updated))
}

async fn delete_invoice(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    let deleted = delete_row(pool, "invoices", &path.invoice_id, "id").await?;
    tracing::info!(invoice_id = %path.invoice_id, "Invoice deleted");
    Ok(Json(deleted))
}

async fn void_invoice(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    let voided = ledger::void_invoice(pool, &path.invoice_id).await?;
    tracing::info!(invoice_id = %path.invoice_id, "Invoice voided");
    Ok(Json(voided))
}
