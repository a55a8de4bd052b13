use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    models::{parse_rows, PropertyRow, TenantRow},
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    routes::support::{
        extract_ids, non_empty_opt, property_labels, rows_in, tenant_names, value_str,
    },
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreateLeaseInput,
        LeasePath, LeasesQuery, UpdateLeaseInput,
    },
    services::{
        cadence::normalize_cadence,
        currency::{safe_numeric, to_usd},
        income::{monthly_income_raw, IncomeContext},
    },
    state::AppState,
};

const LEASE_STATUSES: &[&str] = &["active", "inactive"];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/leases",
            axum::routing::get(list_leases).post(create_lease),
        )
        .route(
            "/leases/{lease_id}",
            axum::routing::get(get_lease)
                .patch(update_lease)
                .delete(delete_lease),
        )
}

async fn list_leases(
    State(state): State<AppState>,
    Query(query): Query<LeasesQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;

    let mut filters = Map::new();
    if let Some(status) = non_empty_opt(query.status.as_deref()) {
        filters.insert(
            "status".to_string(),
            Value::String(status.to_ascii_lowercase()),
        );
    }
    if let Some(property_id) = non_empty_opt(query.property_id.as_deref()) {
        filters.insert("property_id".to_string(), Value::String(property_id));
    }
    if let Some(tenant_id) = non_empty_opt(query.tenant_id.as_deref()) {
        filters.insert("tenant_id".to_string(), Value::String(tenant_id));
    }

    let rows = list_rows(
        pool,
        "leases",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "lease_start_date",
        false,
    )
    .await?;

    let enriched = enrich_leases(pool, rows).await?;
    Ok(Json(json!({ "data": enriched })))
}

async fn create_lease(
    State(state): State<AppState>,
    Json(payload): Json<CreateLeaseInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let mut record = remove_nulls(serialize_to_map(&payload));
    normalize_lease_payload_for_write(&mut record)?;
    check_lease_dates(Some(payload.lease_start_date), payload.lease_end_date)?;

    let pool = state.db_pool()?;
    tokio::try_join!(
        get_row(pool, "properties", &payload.property_id, "id"),
        get_row(pool, "tenants", &payload.tenant_id, "id"),
    )?;

    let created = create_row(pool, "leases", &record).await?;
    tracing::info!(
        lease_id = %value_str(&created, "id"),
        property_id = %payload.property_id,
        "Lease created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    let record = get_row(pool, "leases", &path.lease_id, "id").await?;
    let mut enriched = enrich_leases(pool, vec![record]).await?;
    Ok(Json(enriched.pop().unwrap_or(Value::Null)))
}

async fn update_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
    Json(payload): Json<UpdateLeaseInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let mut patch = remove_nulls(serialize_to_map(&payload));
    normalize_lease_payload_for_write(&mut patch)?;

    let pool = state.db_pool()?;
    if payload.lease_start_date.is_some() || payload.lease_end_date.is_some() {
        let current = get_row(pool, "leases", &path.lease_id, "id").await?;
        let start = payload
            .lease_start_date
            .or_else(|| parse_date(&value_str(&current, "lease_start_date")));
        let end = payload
            .lease_end_date
            .or_else(|| parse_date(&value_str(&current, "lease_end_date")));
        check_lease_dates(start, end)?;
    }

    let updated = update_row(pool, "leases", &path.lease_id, &patch, "id").await?;
    Ok(Json(updated))
}

async fn delete_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    let deleted = delete_row(pool, "leases", &path.lease_id, "id").await?;
    tracing::info!(lease_id = %path.lease_id, "Lease deleted");
    Ok(Json(deleted))
}

/// Stores the canonical cadence and lowercase status; anything unrecognized
/// is rejected.
fn normalize_lease_payload_for_write(payload: &mut Map<String, Value>) -> AppResult<()> {
    if let Some(raw) = payload.get("rent_cadence").and_then(Value::as_str) {
        let cadence = normalize_cadence(Some(raw)).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Unrecognized rent cadence '{}'. Use weekly, biweekly or monthly.",
                raw.trim()
            ))
        })?;
        payload.insert(
            "rent_cadence".to_string(),
            Value::String(cadence.as_str().to_string()),
        );
    }
    if let Some(raw) = payload.get("status").and_then(Value::as_str) {
        let status = raw.trim().to_ascii_lowercase();
        if !LEASE_STATUSES.contains(&status.as_str()) {
            return Err(AppError::BadRequest(
                "status must be active or inactive.".to_string(),
            ));
        }
        payload.insert("status".to_string(), Value::String(status));
    }
    Ok(())
}

fn check_lease_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> AppResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::BadRequest(
                "lease_end_date must be on or after lease_start_date.".to_string(),
            ));
        }
    }
    Ok(())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Adds tenant name, property label and the monthly-equivalent rent.
async fn enrich_leases(pool: &sqlx::PgPool, rows: Vec<Value>) -> AppResult<Vec<Value>> {
    if rows.is_empty() {
        return Ok(rows);
    }

    let tenant_ids = extract_ids(&rows, "tenant_id");
    let property_ids = extract_ids(&rows, "property_id");
    let (tenants, properties) = tokio::try_join!(
        rows_in(pool, "tenants", "id", &tenant_ids),
        rows_in(pool, "properties", "id", &property_ids),
    )?;
    let tenant_name = tenant_names(&parse_rows::<TenantRow>("tenants", tenants));
    let property_label = property_labels(&parse_rows::<PropertyRow>("properties", properties));

    let mut enriched = Vec::with_capacity(rows.len());
    for mut row in rows {
        let tenant_id = value_str(&row, "tenant_id");
        let property_id = value_str(&row, "property_id");
        if let Some(obj) = row.as_object_mut() {
            obj.insert(
                "tenant_name".to_string(),
                tenant_name
                    .get(&tenant_id)
                    .cloned()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            obj.insert(
                "property_label".to_string(),
                property_label
                    .get(&property_id)
                    .cloned()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );

            let monthly = monthly_income_raw(
                safe_numeric(obj.get("rent_amount")),
                obj.get("rent_cadence").and_then(Value::as_str),
                IncomeContext::Dashboard,
            );
            obj.insert("monthly_rent_equivalent".to_string(), json!(monthly));
            obj.insert(
                "monthly_rent_equivalent_display".to_string(),
                Value::String(to_usd(monthly)),
            );
        }
        enriched.push(row);
    }

    Ok(enriched)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{json, Map};

    use super::{check_lease_dates, normalize_lease_payload_for_write};

    #[test]
    fn stores_canonical_cadence() {
        let mut payload = Map::new();
        payload.insert("rent_cadence".to_string(), json!("Every-2-Weeks"));
        payload.insert("status".to_string(), json!(" Active "));
        normalize_lease_payload_for_write(&mut payload).expect("valid lease");
        assert_eq!(payload["rent_cadence"], json!("biweekly"));
        assert_eq!(payload["status"], json!("active"));
    }

    #[test]
    fn rejects_unknown_cadence_and_status() {
        let mut payload = Map::new();
        payload.insert("rent_cadence".to_string(), json!("quarterly"));
        assert!(normalize_lease_payload_for_write(&mut payload).is_err());

        let mut payload = Map::new();
        payload.insert("status".to_string(), json!("pending"));
        assert!(normalize_lease_payload_for_write(&mut payload).is_err());
    }

    #[test]
    fn end_date_cannot_precede_start() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 1);
        let before = NaiveDate::from_ymd_opt(2026, 2, 28);
        assert!(check_lease_dates(start, before).is_err());
        assert!(check_lease_dates(start, start).is_ok());
        assert!(check_lease_dates(start, None).is_ok());
    }
}
