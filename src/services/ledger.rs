//! Invoice writes that keep the derived balance columns in step with the
//! amounts. Every operation is a read followed by sequential updates; there is
//! no transaction around them, so a concurrent writer can interleave.

use std::future::Future;

use chrono::Utc;
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::{
    error::{AppError, AppResult},
    models::same_id,
    repository::table_service::{create_row, get_row, list_all_rows, update_row, upsert_row},
    services::{
        currency::safe_numeric,
        invoice_balance::{
            late_fee_patch, plan_late_fee_move, recompute_invoice, touches_amounts,
            InvoiceAmounts, InvoiceStatus,
        },
    },
};

/// Invoice persistence the ledger runs against.
pub trait LedgerStore: Sync {
    fn fetch_invoice(&self, invoice_id: &str) -> impl Future<Output = AppResult<Value>> + Send;

    fn insert_invoice(
        &self,
        record: &Map<String, Value>,
    ) -> impl Future<Output = AppResult<Value>> + Send;

    fn patch_invoice(
        &self,
        invoice_id: &str,
        patch: &Map<String, Value>,
    ) -> impl Future<Output = AppResult<Value>> + Send;

    /// OPEN invoices of the lease with a late fee above zero, oldest due first.
    fn open_invoices_with_late_fees(
        &self,
        lease_id: &str,
    ) -> impl Future<Output = AppResult<Vec<Value>>> + Send;

    /// One waiver row per invoice; waiving the same invoice again adds onto
    /// its `amount_waived`.
    fn record_waiver(
        &self,
        waiver: &Map<String, Value>,
    ) -> impl Future<Output = AppResult<Value>> + Send;
}

impl LedgerStore for PgPool {
    async fn fetch_invoice(&self, invoice_id: &str) -> AppResult<Value> {
        get_row(self, "invoices", invoice_id, "id").await
    }

    async fn insert_invoice(&self, record: &Map<String, Value>) -> AppResult<Value> {
        create_row(self, "invoices", record).await
    }

    async fn patch_invoice(
        &self,
        invoice_id: &str,
        patch: &Map<String, Value>,
    ) -> AppResult<Value> {
        update_row(self, "invoices", invoice_id, patch, "id").await
    }

    async fn open_invoices_with_late_fees(&self, lease_id: &str) -> AppResult<Vec<Value>> {
        let mut filters = Map::new();
        filters.insert("lease_id".to_string(), Value::String(lease_id.to_string()));
        filters.insert(
            "status".to_string(),
            Value::String(InvoiceStatus::Open.as_str().to_string()),
        );
        filters.insert("amount_late__gt".to_string(), json!(0));
        list_all_rows(self, "invoices", Some(&filters), "due_date", true).await
    }

    async fn record_waiver(&self, waiver: &Map<String, Value>) -> AppResult<Value> {
        upsert_row(self, "late_fee_waivers", waiver, "invoice_id", &["amount_waived"]).await
    }
}

fn invoice_status(invoice: &Value) -> Option<InvoiceStatus> {
    invoice
        .get("status")
        .and_then(Value::as_str)
        .and_then(InvoiceStatus::parse)
}

fn text_field<'a>(row: &'a Value, key: &str) -> &'a str {
    row.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Creates an invoice with its total, balance and status derived from the
/// supplied amounts.
pub async fn create_invoice<S: LedgerStore>(
    store: &S,
    mut payload: Map<String, Value>,
) -> AppResult<Value> {
    let amounts = InvoiceAmounts::default().overlay(&payload);
    recompute_invoice(&amounts, Utc::now()).write_into(&mut payload);
    store.insert_invoice(&payload).await
}

/// Applies a partial update. When any amount field is present the stored row
/// is read first so unsupplied amounts keep their values in the recompute.
pub async fn update_invoice<S: LedgerStore>(
    store: &S,
    invoice_id: &str,
    mut patch: Map<String, Value>,
) -> AppResult<Value> {
    if touches_amounts(&patch) {
        let current = store.fetch_invoice(invoice_id).await?;
        let amounts = InvoiceAmounts::from_row(&current).overlay(&patch);
        recompute_invoice(&amounts, Utc::now())
            .keeping_void(invoice_status(&current))
            .write_into(&mut patch);
    }
    store.patch_invoice(invoice_id, &patch).await
}

pub async fn void_invoice<S: LedgerStore>(store: &S, invoice_id: &str) -> AppResult<Value> {
    let current = store.fetch_invoice(invoice_id).await?;
    if invoice_status(&current) == Some(InvoiceStatus::Void) {
        return Ok(current);
    }
    let mut patch = Map::new();
    patch.insert(
        "status".to_string(),
        Value::String(InvoiceStatus::Void.as_str().to_string()),
    );
    patch.insert("paid_in_full_at".to_string(), Value::Null);
    store.patch_invoice(invoice_id, &patch).await
}

/// Adds `delta` to the invoice's paid amount (negative when a payment is
/// removed or reduced) and recomputes.
pub async fn apply_payment<S: LedgerStore>(
    store: &S,
    invoice_id: &str,
    delta: f64,
) -> AppResult<Value> {
    let current = store.fetch_invoice(invoice_id).await?;
    let amounts = InvoiceAmounts::from_row(&current).with_payment(delta);

    let mut patch = Map::new();
    patch.insert("amount_paid".to_string(), json!(amounts.amount_paid));
    recompute_invoice(&amounts, Utc::now())
        .keeping_void(invoice_status(&current))
        .write_into(&mut patch);

    tracing::info!(invoice_id, delta, "Applied payment to invoice");
    store.patch_invoice(invoice_id, &patch).await
}

pub async fn set_late_fee<S: LedgerStore>(
    store: &S,
    invoice_id: &str,
    amount_late: f64,
) -> AppResult<Value> {
    let invoice = store.fetch_invoice(invoice_id).await?;
    let patch = late_fee_patch(&invoice, amount_late, Utc::now())?;
    store.patch_invoice(invoice_id, &patch).await
}

/// Moves a late fee (all of it unless `amount` is given) between two invoices
/// of the same lease. Returns the updated source and target.
pub async fn move_late_fee<S: LedgerStore>(
    store: &S,
    source_id: &str,
    target_id: &str,
    amount: Option<f64>,
) -> AppResult<(Value, Value)> {
    if same_id(source_id, target_id) {
        return Err(AppError::BadRequest(
            "Source and target invoices must differ.".to_string(),
        ));
    }

    let (source, target) = tokio::try_join!(
        store.fetch_invoice(source_id),
        store.fetch_invoice(target_id),
    )?;
    let source_lease = text_field(&source, "lease_id");
    if source_lease.is_empty() || !same_id(source_lease, text_field(&target, "lease_id")) {
        return Err(AppError::BadRequest(
            "Late fees can only move between invoices of the same lease.".to_string(),
        ));
    }

    let (source_late, target_late) = plan_late_fee_move(
        safe_numeric(source.get("amount_late")),
        safe_numeric(target.get("amount_late")),
        amount,
    )?;

    let now = Utc::now();
    let source_patch = late_fee_patch(&source, source_late, now)?;
    let target_patch = late_fee_patch(&target, target_late, now)?;

    let source = store.patch_invoice(source_id, &source_patch).await?;
    let target = store.patch_invoice(target_id, &target_patch).await?;
    Ok((source, target))
}

/// Waiver row for zeroing `invoice`'s late fee. Fails when there is no fee
/// to waive.
fn waiver_record(invoice: &Value, reason: Option<String>) -> AppResult<Map<String, Value>> {
    let waived = safe_numeric(invoice.get("amount_late"));
    if waived <= 0.0 {
        return Err(AppError::BadRequest(
            "Invoice has no late fee to waive.".to_string(),
        ));
    }

    let mut waiver = Map::new();
    for key in ["id", "lease_id", "due_date"] {
        let column = if key == "id" { "invoice_id" } else { key };
        waiver.insert(
            column.to_string(),
            invoice.get(key).cloned().unwrap_or(Value::Null),
        );
    }
    waiver.insert("amount_waived".to_string(), json!(waived));
    if let Some(reason) = reason.filter(|reason| !reason.trim().is_empty()) {
        waiver.insert("reason".to_string(), Value::String(reason));
    }
    Ok(waiver)
}

/// Records the waiver, then zeroes the late fee. Returns the updated invoice
/// and the waiver row.
pub async fn waive_late_fee<S: LedgerStore>(
    store: &S,
    invoice_id: &str,
    reason: Option<String>,
) -> AppResult<(Value, Value)> {
    let invoice = store.fetch_invoice(invoice_id).await?;
    let waiver = waiver_record(&invoice, reason)?;
    let patch = late_fee_patch(&invoice, 0.0, Utc::now())?;

    let waiver = store.record_waiver(&waiver).await?;
    let updated = store
        .patch_invoice(invoice_id, &patch)
        .await
        .inspect_err(|error| {
            tracing::error!(
                invoice_id,
                waiver_id = %text_field(&waiver, "id"),
                error = %error,
                "Waiver recorded but the late fee was not cleared"
            );
        })?;

    Ok((updated, waiver))
}

/// Clears the late fee on every open invoice of a lease that carries one.
/// Updates run one at a time; the first failure aborts the batch and the
/// invoices already cleared stay cleared.
pub async fn remove_all_late_fees<S: LedgerStore>(
    store: &S,
    lease_id: &str,
) -> AppResult<Vec<Value>> {
    let invoices = store.open_invoices_with_late_fees(lease_id).await?;

    let now = Utc::now();
    let mut updated = Vec::with_capacity(invoices.len());
    for invoice in &invoices {
        let id = text_field(invoice, "id");
        let cleared = match late_fee_patch(invoice, 0.0, now) {
            Ok(patch) => store.patch_invoice(id, &patch).await,
            Err(error) => Err(error),
        };
        match cleared {
            Ok(row) => updated.push(row),
            Err(error) => {
                tracing::warn!(
                    lease_id,
                    invoice_id = %id,
                    cleared = updated.len(),
                    remaining = invoices.len() - updated.len(),
                    "Late fee removal stopped part-way"
                );
                return Err(AppError::Dependency(format!(
                    "Removing late fees did not finish; {} of {} invoices were already cleared. {error}",
                    updated.len(),
                    invoices.len()
                )));
            }
        }
    }

    tracing::info!(lease_id, cleared = updated.len(), "Removed late fees");
    Ok(updated)
}
