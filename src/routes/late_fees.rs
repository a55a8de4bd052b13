use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    schemas::{
        validate_input, MoveLateFeeInput, RemoveAllLateFeesInput, SetLateFeeInput,
        WaiveLateFeeInput,
    },
    services::{invoice_balance::validate_late_fee, ledger},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/late-fees/set", axum::routing::post(set_late_fee))
        .route("/late-fees/move", axum::routing::post(move_late_fee))
        .route("/late-fees/waive", axum::routing::post(waive_late_fee))
        .route(
            "/late-fees/remove-all",
            axum::routing::post(remove_all_late_fees),
        )
}

async fn set_late_fee(
    State(state): State<AppState>,
    Json(payload): Json<SetLateFeeInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let amount_late = validate_late_fee(payload.amount_late.unwrap_or_default())?;

    let pool = state.db_pool()?;
    let invoice = ledger::set_late_fee(pool, payload.invoice_id.trim(), amount_late).await?;
    tracing::info!(invoice_id = %payload.invoice_id, amount_late, "Late fee set");
    Ok(Json(json!({ "invoice": invoice })))
}

async fn move_late_fee(
    State(state): State<AppState>,
    Json(payload): Json<MoveLateFeeInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    if let Some(amount) = payload.amount {
        validate_late_fee(amount)?;
    }

    let pool = state.db_pool()?;
    let (source, target) = ledger::move_late_fee(
        pool,
        payload.source_invoice_id.trim(),
        payload.target_invoice_id.trim(),
        payload.amount,
    )
    .await?;
    tracing::info!(
        source_invoice_id = %payload.source_invoice_id,
        target_invoice_id = %payload.target_invoice_id,
        "Late fee moved"
    );
    Ok(Json(json!({ "source": source, "target": target })))
}

async fn waive_late_fee(
    State(state): State<AppState>,
    Json(payload): Json<WaiveLateFeeInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;

    let pool = state.db_pool()?;
    let (invoice, waiver) =
        ledger::waive_late_fee(pool, payload.invoice_id.trim(), payload.reason).await?;
    tracing::info!(invoice_id = %payload.invoice_id, "Late fee waived");
    Ok(Json(json!({ "invoice": invoice, "waiver": waiver })))
}

async fn remove_all_late_fees(
    State(state): State<AppState>,
    Json(payload): Json<RemoveAllLateFeesInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;

    let pool = state.db_pool()?;
    let updated = ledger::remove_all_late_fees(pool, payload.lease_id.trim()).await?;
    Ok(Json(json!({
        "lease_id": payload.lease_id.trim(),
        "cleared": updated.len(),
        "data": updated,
    })))
}
