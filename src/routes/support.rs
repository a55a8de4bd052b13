//! Small helpers shared by the resource routers.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};

use crate::{
    error::AppResult,
    models::{PropertyRow, TenantRow},
    repository::table_service::list_all_rows,
};

pub fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

pub fn value_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

pub fn json_map(entries: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert((*key).to_string(), value.clone());
    }
    map
}

pub fn extract_ids(rows: &[Value], key: &str) -> HashSet<String> {
    rows.iter()
        .map(|row| value_str(row, key))
        .filter(|id| !id.is_empty())
        .collect()
}

pub fn id_array<'a>(ids: impl IntoIterator<Item = &'a String>) -> Value {
    Value::Array(ids.into_iter().cloned().map(Value::String).collect())
}

pub fn today_or(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or_else(|| Utc::now().date_naive())
}

/// Rows of `table` whose `column` is one of `ids`, in one query.
pub async fn rows_in(
    pool: &sqlx::PgPool,
    table: &str,
    column: &str,
    ids: &HashSet<String>,
) -> AppResult<Vec<Value>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let key = format!("{column}__in");
    let filters = json_map(&[(key.as_str(), id_array(ids))]);
    list_all_rows(pool, table, Some(&filters), "created_at", false).await
}

pub fn tenant_names(tenants: &[TenantRow]) -> HashMap<String, String> {
    tenants
        .iter()
        .map(|tenant| (tenant.id.clone(), tenant.display_name()))
        .collect()
}

pub fn property_labels(properties: &[PropertyRow]) -> HashMap<String, String> {
    properties
        .iter()
        .map(|property| (property.id.clone(), property.label()))
        .collect()
}
