use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    services::currency::{round_cents, safe_numeric},
};

pub const AMOUNT_FIELDS: &[&str] = &["amount_rent", "amount_late", "amount_other", "amount_paid"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Open,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Paid => "PAID",
            Self::Void => "VOID",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(Self::Open),
            "PAID" => Some(Self::Paid),
            "VOID" => Some(Self::Void),
            _ => None,
        }
    }
}

/// The four inputs an invoice balance is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InvoiceAmounts {
    pub amount_rent: f64,
    pub amount_late: f64,
    pub amount_other: f64,
    pub amount_paid: f64,
}

impl InvoiceAmounts {
    pub fn from_row(row: &Value) -> Self {
        let field = |key: &str| safe_numeric(row.get(key));
        Self {
            amount_rent: field("amount_rent"),
            amount_late: field("amount_late"),
            amount_other: field("amount_other"),
            amount_paid: field("amount_paid"),
        }
    }

    /// Fields present in `patch` replace the persisted ones; the rest keep
    /// their prior values.
    pub fn overlay(self, patch: &Map<String, Value>) -> Self {
        let field = |key: &str, prior: f64| {
            patch
                .get(key)
                .filter(|value| !value.is_null())
                .map_or(prior, |value| safe_numeric(value))
        };
        Self {
            amount_rent: field("amount_rent", self.amount_rent),
            amount_late: field("amount_late", self.amount_late),
            amount_other: field("amount_other", self.amount_other),
            amount_paid: field("amount_paid", self.amount_paid),
        }
    }

    pub fn with_late_fee(self, amount_late: f64) -> Self {
        Self {
            amount_late,
            ..self
        }
    }

    /// Adds (or, for a negative delta, removes) a payment. Paid never drops
    /// below zero.
    pub fn with_payment(self, delta: f64) -> Self {
        Self {
            amount_paid: round_cents((self.amount_paid + delta).max(0.0)),
            ..self
        }
    }
}

pub fn touches_amounts(patch: &Map<String, Value>) -> bool {
    AMOUNT_FIELDS.iter().any(|key| patch.contains_key(*key))
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceBalance {
    pub amount_total: f64,
    pub balance_due: f64,
    pub status: InvoiceStatus,
    pub paid_in_full_at: Option<DateTime<Utc>>,
}

impl InvoiceBalance {
    /// A voided invoice stays voided whatever its balance.
    pub fn keeping_void(self, prior: Option<InvoiceStatus>) -> Self {
        if prior == Some(InvoiceStatus::Void) {
            return Self {
                status: InvoiceStatus::Void,
                paid_in_full_at: None,
                ..self
            };
        }
        self
    }

    /// Writes the derived columns into an update payload.
    pub fn write_into(&self, patch: &mut Map<String, Value>) {
        patch.insert("amount_total".to_string(), json!(self.amount_total));
        patch.insert("balance_due".to_string(), json!(self.balance_due));
        patch.insert(
            "status".to_string(),
            Value::String(self.status.as_str().to_string()),
        );
        patch.insert(
            "paid_in_full_at".to_string(),
            self.paid_in_full_at
                .map(|at| Value::String(at.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
    }
}

/// total = rent + late + other; balance = total - paid; PAID iff balance <= 0.
pub fn recompute_invoice(amounts: &InvoiceAmounts, now: DateTime<Utc>) -> InvoiceBalance {
    let amount_total = round_cents(amounts.amount_rent + amounts.amount_late + amounts.amount_other);
    let balance_due = round_cents(amount_total - amounts.amount_paid);
    let status = if balance_due <= 0.0 {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::Open
    };
    InvoiceBalance {
        amount_total,
        balance_due,
        status,
        paid_in_full_at: (status == InvoiceStatus::Paid).then_some(now),
    }
}

/// Update payload for a late-fee-only change: `amount_late` forced to the new
/// value, rent and other untouched, derived columns recomputed.
pub fn late_fee_patch(
    invoice: &Value,
    amount_late: f64,
    now: DateTime<Utc>,
) -> AppResult<Map<String, Value>> {
    let amount_late = validate_late_fee(amount_late)?;
    let prior_status = invoice
        .get("status")
        .and_then(Value::as_str)
        .and_then(InvoiceStatus::parse);
    let amounts = InvoiceAmounts::from_row(invoice).with_late_fee(amount_late);
    let balance = recompute_invoice(&amounts, now).keeping_void(prior_status);

    let mut patch = Map::new();
    patch.insert("amount_late".to_string(), json!(amount_late));
    balance.write_into(&mut patch);
    Ok(patch)
}

pub fn validate_late_fee(amount: f64) -> AppResult<f64> {
    if !amount.is_finite() {
        return Err(AppError::BadRequest(
            "Late fee amount must be a number.".to_string(),
        ));
    }
    if amount < 0.0 {
        return Err(AppError::BadRequest(
            "Late fee amount cannot be negative.".to_string(),
        ));
    }
    Ok(round_cents(amount))
}

/// Splits a late-fee move into the new late amounts for source and target.
/// `amount` defaults to the source's whole late fee.
pub fn plan_late_fee_move(
    source_late: f64,
    target_late: f64,
    amount: Option<f64>,
) -> AppResult<(f64, f64)> {
    let moved = validate_late_fee(amount.unwrap_or(source_late))?;
    if moved > round_cents(source_late) {
        return Err(AppError::BadRequest(
            "Cannot move more than the source invoice's late fee.".to_string(),
        ));
    }
    Ok((
        round_cents(source_late - moved),
        round_cents(target_late + moved),
    ))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Map, Value};

    use super::{
        late_fee_patch, plan_late_fee_move, recompute_invoice, touches_amounts, InvoiceAmounts,
        InvoiceStatus,
    };
    use crate::error::AppError;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn partial_payment_leaves_invoice_open() {
        let amounts = InvoiceAmounts {
            amount_rent: 1000.0,
            amount_late: 50.0,
            amount_other: 25.5,
            amount_paid: 400.0,
        };
        let balance = recompute_invoice(&amounts, now());
        assert_eq!(balance.amount_total, 1075.5);
        assert_eq!(balance.balance_due, 675.5);
        assert_eq!(balance.status, InvoiceStatus::Open);
        assert_eq!(balance.paid_in_full_at, None);
    }

    #[test]
    fn exact_and_over_payment_mark_paid() {
        let exact = InvoiceAmounts {
            amount_rent: 0.1,
            amount_other: 0.2,
            amount_paid: 0.3,
            ..InvoiceAmounts::default()
        };
        let balance = recompute_invoice(&exact, now());
        assert_eq!(balance.balance_due, 0.0);
        assert_eq!(balance.status, InvoiceStatus::Paid);
        assert_eq!(balance.paid_in_full_at, Some(now()));

        let over = InvoiceAmounts {
            amount_rent: 500.0,
            amount_paid: 650.0,
            ..InvoiceAmounts::default()
        };
        let balance = recompute_invoice(&over, now());
        assert_eq!(balance.balance_due, -150.0);
        assert_eq!(balance.status, InvoiceStatus::Paid);
    }

    #[test]
    fn recompute_is_idempotent() {
        let amounts = InvoiceAmounts {
            amount_rent: 812.37,
            amount_late: 35.0,
            amount_other: 0.0,
            amount_paid: 100.0,
        };
        let once = recompute_invoice(&amounts, now());
        let twice = recompute_invoice(&amounts, now());
        assert_eq!(once, twice);
    }

    #[test]
    fn overlay_keeps_unsupplied_fields() {
        let row = json!({
            "amount_rent": "900.00",
            "amount_late": "45.00",
            "amount_other": 10,
            "amount_paid": "0"
        });
        let mut patch = Map::new();
        patch.insert("amount_paid".to_string(), json!(955));
        let amounts = InvoiceAmounts::from_row(&row).overlay(&patch);
        assert_eq!(amounts.amount_rent, 900.0);
        assert_eq!(amounts.amount_late, 45.0);
        assert_eq!(amounts.amount_paid, 955.0);
        assert_eq!(recompute_invoice(&amounts, now()).status, InvoiceStatus::Paid);
        assert!(touches_amounts(&patch));
        assert!(!touches_amounts(&Map::new()));
    }

    #[test]
    fn payments_never_drive_paid_negative() {
        let amounts = InvoiceAmounts {
            amount_rent: 100.0,
            amount_paid: 40.0,
            ..InvoiceAmounts::default()
        };
        assert_eq!(amounts.with_payment(-60.0).amount_paid, 0.0);
        assert_eq!(amounts.with_payment(60.0).amount_paid, 100.0);
    }

    #[test]
    fn late_fee_patch_recomputes_without_touching_rent() {
        let invoice = json!({
            "amount_rent": 1000,
            "amount_late": 75,
            "amount_other": 0,
            "amount_paid": 1000,
            "status": "OPEN"
        });
        let patch = late_fee_patch(&invoice, 0.0, now()).expect("patch");
        assert_eq!(patch.get("amount_late"), Some(&json!(0.0)));
        assert_eq!(patch.get("amount_total"), Some(&json!(1000.0)));
        assert_eq!(patch.get("balance_due"), Some(&json!(0.0)));
        assert_eq!(patch.get("status"), Some(&json!("PAID")));
        assert!(!patch.contains_key("amount_rent"));
        assert!(patch.get("paid_in_full_at").is_some_and(Value::is_string));
    }

    #[test]
    fn voided_invoices_stay_void() {
        let invoice = json!({"amount_rent": 500, "amount_paid": 0, "status": "VOID"});
        let patch = late_fee_patch(&invoice, 25.0, now()).expect("patch");
        assert_eq!(patch.get("status"), Some(&json!("VOID")));
        assert_eq!(patch.get("paid_in_full_at"), Some(&Value::Null));
    }

    #[test]
    fn negative_late_fee_is_rejected() {
        let invoice = json!({"amount_rent": 500});
        assert!(matches!(
            late_fee_patch(&invoice, -1.0, now()),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn plans_late_fee_moves() {
        assert_eq!(plan_late_fee_move(50.0, 0.0, None).expect("move"), (0.0, 50.0));
        assert_eq!(
            plan_late_fee_move(50.0, 10.0, Some(20.0)).expect("move"),
            (30.0, 30.0)
        );
        assert!(plan_late_fee_move(50.0, 0.0, Some(60.0)).is_err());
        assert!(plan_late_fee_move(50.0, 0.0, Some(-5.0)).is_err());
    }

    #[test]
    fn parses_status_case_insensitively() {
        assert_eq!(InvoiceStatus::parse(" paid "), Some(InvoiceStatus::Paid));
        assert_eq!(InvoiceStatus::parse("void"), Some(InvoiceStatus::Void));
        assert_eq!(InvoiceStatus::parse("draft"), None);
    }
}
