//! Typed views over rows returned by the table service. Numeric columns may
//! arrive as JSON numbers, NUMERIC text or imported display text such as
//! `$1,200.00`.

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;
use uuid::Uuid;

use crate::services::{
    cadence::{normalize_cadence, RentCadence},
    currency::{from_usd, safe_numeric},
    invoice_balance::InvoiceStatus,
};

pub const PROPERTY_TYPES: &[&str] = &["house", "doublewide", "singlewide", "loan"];

fn money<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::String(text) => from_usd(text),
        other => safe_numeric(other),
    })
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => flag,
        Value::String(text) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        Value::Number(number) => number.as_i64().is_some_and(|value| value != 0),
        _ => false,
    })
}

/// Row ids compare as uuids when both sides parse, so case and padding do
/// not matter; other ids compare trimmed.
pub fn same_id(left: &str, right: &str) -> bool {
    match (Uuid::parse_str(left.trim()), Uuid::parse_str(right.trim())) {
        (Ok(left), Ok(right)) => left == right,
        _ => left.trim() == right.trim(),
    }
}

/// Rows that fail to parse are skipped with a warning instead of failing the
/// whole request.
pub fn parse_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(parsed) => Some(parsed),
            Err(error) => {
                tracing::warn!(table, error = %error, "Skipping malformed row");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyRow {
    pub id: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "money")]
    pub rent_value: f64,
    #[serde(default, deserialize_with = "money")]
    pub insurance_premium: f64,
    #[serde(default, deserialize_with = "money")]
    pub property_tax: f64,
}

impl PropertyRow {
    pub fn label(&self) -> String {
        match (self.address.as_deref(), self.city.as_deref()) {
            (Some(address), Some(city)) if !city.trim().is_empty() => format!("{address}, {city}"),
            (Some(address), _) => address.to_string(),
            _ => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantRow {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub is_active: bool,
}

impl TenantRow {
    pub fn display_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaseRow {
    pub id: String,
    #[serde(default)]
    pub property_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default, deserialize_with = "money")]
    pub rent_amount: f64,
    #[serde(default)]
    pub rent_cadence: Option<String>,
    #[serde(default)]
    pub lease_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub lease_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: String,
}

impl LeaseRow {
    pub fn is_active(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("active")
    }

    pub fn cadence(&self) -> Option<RentCadence> {
        normalize_cadence(self.rent_cadence.as_deref())
    }

    /// Active and its date range (open-ended when there is no end date)
    /// contains `date`.
    pub fn covers(&self, date: NaiveDate) -> bool {
        let Some(start) = self.lease_start_date else {
            return false;
        };
        self.is_active() && start <= date && self.lease_end_date.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceRow {
    pub id: String,
    pub lease_id: String,
    pub due_date: NaiveDate,
    #[serde(default, deserialize_with = "money")]
    pub amount_late: f64,
    #[serde(default, deserialize_with = "money")]
    pub balance_due: f64,
    #[serde(default)]
    pub status: String,
}

impl InvoiceRow {
    pub fn status(&self) -> Option<InvoiceStatus> {
        InvoiceStatus::parse(&self.status)
    }

    /// OPEN with money still owed.
    pub fn is_unpaid(&self) -> bool {
        self.status() == Some(InvoiceStatus::Open) && self.balance_due > 0.0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRow {
    pub id: String,
    #[serde(default)]
    pub lease_id: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    pub payment_date: NaiveDate,
    #[serde(default, deserialize_with = "money")]
    pub amount: f64,
    #[serde(default)]
    pub payment_type: Option<String>,
}
