use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::BadRequest(format!("Validation failed: {errors}")))
}

fn default_true() -> bool {
    true
}
fn default_lease_status() -> String {
    "active".to_string()
}
fn default_limit_100() -> i64 {
    100
}
fn default_limit_500() -> i64 {
    500
}

pub fn clamp_limit_in_range(limit: i64, minimum: i64, maximum: i64) -> i64 {
    limit.clamp(minimum, maximum)
}

pub fn serialize_to_map<T>(value: &T) -> serde_json::Map<String, serde_json::Value>
where
    T: serde::Serialize,
{
    let json = serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|_, value| !value.is_null());
    map
}

// ── Properties ──

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreatePropertyInput {
    #[validate(length(min = 1, max = 255))]
    pub address: String,
    #[validate(length(max = 120))]
    pub city: Option<String>,
    pub property_type: String,
    #[validate(range(min = 0.0))]
    pub rent_value: Option<f64>,
    #[validate(range(min = 0.0))]
    pub insurance_premium: Option<f64>,
    #[validate(range(min = 0.0))]
    pub property_tax: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdatePropertyInput {
    #[validate(length(min = 1, max = 255))]
    pub address: Option<String>,
    #[validate(length(max = 120))]
    pub city: Option<String>,
    pub property_type: Option<String>,
    #[validate(range(min = 0.0))]
    pub rent_value: Option<f64>,
    #[validate(range(min = 0.0))]
    pub insurance_premium: Option<f64>,
    #[validate(range(min = 0.0))]
    pub property_tax: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PropertiesQuery {
    pub property_type: Option<String>,
    pub city: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct OccupancyQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PropertyPath {
    pub property_id: String,
}

// ── Tenants ──

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateTenantInput {
    #[validate(length(min = 1, max = 120))]
    pub first_name: String,
    #[validate(length(min = 1, max = 120))]
    pub last_name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateTenantInput {
    #[validate(length(min = 1, max = 120))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub last_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TenantsQuery {
    pub is_active: Option<bool>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct TenantPath {
    pub tenant_id: String,
}

// ── Leases ──

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateLeaseInput {
    #[validate(length(min = 1))]
    pub property_id: String,
    #[validate(length(min = 1))]
    pub tenant_id: String,
    #[validate(range(min = 0.0))]
    pub rent_amount: f64,
    pub rent_cadence: String,
    pub lease_start_date: NaiveDate,
    pub lease_end_date: Option<NaiveDate>,
    #[serde(default = "default_lease_status")]
    pub status: String,
    #[validate(range(min = 1, max = 31))]
    pub rent_due_day: Option<i16>,
    #[validate(range(min = 0, max = 60))]
    pub grace_days: Option<i16>,
    #[validate(range(min = 0.0))]
    pub late_fee_amount: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateLeaseInput {
    pub property_id: Option<String>,
    pub tenant_id: Option<String>,
    #[validate(range(min = 0.0))]
    pub rent_amount: Option<f64>,
    pub rent_cadence: Option<String>,
    pub lease_start_date: Option<NaiveDate>,
    pub lease_end_date: Option<NaiveDate>,
    pub status: Option<String>,
    #[validate(range(min = 1, max = 31))]
    pub rent_due_day: Option<i16>,
    #[validate(range(min = 0, max = 60))]
    pub grace_days: Option<i16>,
    #[validate(range(min = 0.0))]
    pub late_fee_amount: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct LeasesQuery {
    pub property_id: Option<String>,
    pub tenant_id: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct LeasePath {
    pub lease_id: String,
}

// ── Invoices ──

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateInvoiceInput {
    #[validate(length(min = 1))]
    pub lease_id: String,
    pub due_date: NaiveDate,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub amount_rent: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub amount_late: f64,
    #[serde(default)]
    pub amount_other: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub amount_paid: f64,
    pub notes: Option<String>,
}

/// Status is derived from the amounts; voiding has its own endpoint.
#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateInvoiceInput {
    pub due_date: Option<NaiveDate>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    pub amount_rent: Option<f64>,
    #[validate(range(min = 0.0))]
    pub amount_late: Option<f64>,
    pub amount_other: Option<f64>,
    #[validate(range(min = 0.0))]
    pub amount_paid: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct InvoicesQuery {
    pub lease_id: Option<String>,
    pub status: Option<String>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct InvoicePath {
    pub invoice_id: String,
}

/// Inclusive date window for the by-period lookups.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PeriodQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default = "default_limit_500")]
    pub limit: i64,
}

// ── Payments ──

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreatePaymentInput {
    #[validate(length(min = 1))]
    pub lease_id: String,
    pub property_id: Option<String>,
    pub tenant_id: Option<String>,
    pub invoice_id: Option<String>,
    pub payment_date: NaiveDate,
    #[validate(range(exclusive_min = 0.0))]
    pub amount: f64,
    #[validate(length(max = 40))]
    pub payment_type: Option<String>,
    pub notes: Option<String>,
}

/// The lease and invoice a payment belongs to are fixed once recorded.
#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdatePaymentInput {
    pub payment_date: Option<NaiveDate>,
    #[validate(range(exclusive_min = 0.0))]
    pub amount: Option<f64>,
    #[validate(length(max = 40))]
    pub payment_type: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PaymentsQuery {
    pub lease_id: Option<String>,
    pub property_id: Option<String>,
    pub invoice_id: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PaymentPath {
    pub payment_id: String,
}

// ── Late fees ──
// Identifiers default to empty so a missing one fails validation with 400.

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct SetLateFeeInput {
    #[serde(default)]
    #[validate(length(min = 1, message = "invoice_id is required"))]
    pub invoice_id: String,
    #[validate(required(message = "amount_late is required"))]
    pub amount_late: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct MoveLateFeeInput {
    #[serde(default)]
    #[validate(length(min = 1, message = "source_invoice_id is required"))]
    pub source_invoice_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "target_invoice_id is required"))]
    pub target_invoice_id: String,
    /// Defaults to the source invoice's whole late fee.
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct WaiveLateFeeInput {
    #[serde(default)]
    #[validate(length(min = 1, message = "invoice_id is required"))]
    pub invoice_id: String,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct RemoveAllLateFeesInput {
    #[serde(default)]
    #[validate(length(min = 1, message = "lease_id is required"))]
    pub lease_id: String,
}

// ── Reports ──

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct LateTenantsQuery {
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct MetricsQuery {
    pub as_of: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        remove_nulls, serialize_to_map, validate_input, CreateLeaseInput, CreatePaymentInput,
        CreateTenantInput, SetLateFeeInput, UpdateInvoiceInput,
    };
    use crate::error::AppError;

    #[test]
    fn update_payload_drops_unset_fields() {
        let input: UpdateInvoiceInput =
            serde_json::from_value(json!({"amount_paid": 250.0})).expect("input");
        let patch = remove_nulls(serialize_to_map(&input));
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("amount_paid"), Some(&json!(250.0)));
    }

    #[test]
    fn lease_defaults_to_active() {
        let input: CreateLeaseInput = serde_json::from_value(json!({
            "property_id": "p1",
            "tenant_id": "t1",
            "rent_amount": 950,
            "rent_cadence": "monthly",
            "lease_start_date": "2026-01-01"
        }))
        .expect("input");
        assert_eq!(input.status, "active");
        assert!(validate_input(&input).is_ok());
        let payload = serialize_to_map(&input);
        assert_eq!(payload.get("lease_start_date"), Some(&json!("2026-01-01")));
    }

    #[test]
    fn validation_failures_are_bad_requests() {
        let tenant: CreateTenantInput = serde_json::from_value(json!({
            "first_name": "",
            "last_name": "Reyes",
            "email": "not-an-email"
        }))
        .expect("input");
        assert!(matches!(
            validate_input(&tenant),
            Err(AppError::BadRequest(_))
        ));

        let payment: CreatePaymentInput = serde_json::from_value(json!({
            "lease_id": "l1",
            "payment_date": "2026-03-01",
            "amount": 0
        }))
        .expect("input");
        assert!(validate_input(&payment).is_err());
    }

    #[test]
    fn missing_late_fee_ids_fail_validation() {
        let input: SetLateFeeInput = serde_json::from_value(json!({"amount_late": 25})).expect("input");
        let Err(AppError::BadRequest(message)) = validate_input(&input) else {
            panic!("expected a bad request");
        };
        assert!(message.contains("invoice_id is required"), "{message}");

        let input: SetLateFeeInput =
            serde_json::from_value(json!({"invoice_id": "inv-1"})).expect("input");
        assert!(validate_input(&input).is_err());
    }
}
