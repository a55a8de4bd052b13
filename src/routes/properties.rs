use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    models::{parse_rows, LeaseRow, PROPERTY_TYPES},
    repository::table_service::{
        create_row, delete_row, get_row, list_all_rows, list_rows, update_row,
    },
    routes::support::{json_map, non_empty_opt, today_or},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreatePropertyInput,
        OccupancyQuery, PropertiesQuery, PropertyPath, UpdatePropertyInput,
    },
    services::metrics::{property_occupancy, Occupancy},
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/properties",
            axum::routing::get(list_properties).post(create_property),
        )
        .route(
            "/properties/{property_id}",
            axum::routing::get(get_property)
                .patch(update_property)
                .delete(delete_property),
        )
        .route(
            "/properties/{property_id}/occupancy",
            axum::routing::get(get_occupancy),
        )
}

async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<PropertiesQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;

    let mut filters = Map::new();
    if let Some(property_type) = non_empty_opt(query.property_type.as_deref()) {
        filters.insert(
            "property_type".to_string(),
            Value::String(property_type.to_ascii_lowercase()),
        );
    }
    if let Some(city) = non_empty_opt(query.city.as_deref()) {
        filters.insert("city__ilike".to_string(), Value::String(city));
    }
    let rows = list_rows(
        pool,
        "properties",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "address",
        true,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_property(
    State(state): State<AppState>,
    Json(payload): Json<CreatePropertyInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let mut record = remove_nulls(serialize_to_map(&payload));
    normalize_property_type(&mut record)?;

    let pool = state.db_pool()?;
    let created = create_row(pool, "properties", &record).await?;
    tracing::info!(property_id = %created["id"], "Property created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    let record = get_row(pool, "properties", &path.property_id, "id").await?;
    Ok(Json(record))
}

async fn update_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
    Json(payload): Json<UpdatePropertyInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let mut patch = remove_nulls(serialize_to_map(&payload));
    normalize_property_type(&mut patch)?;

    let pool = state.db_pool()?;
    let updated = update_row(pool, "properties", &path.property_id, &patch, "id").await?;
    Ok(Json(updated))
}

async fn delete_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    let deleted = delete_row(pool, "properties", &path.property_id, "id").await?;
    tracing::info!(property_id = %path.property_id, "Property deleted");
    Ok(Json(deleted))
}

async fn get_occupancy(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
    Query(query): Query<OccupancyQuery>,
) -> AppResult<Json<Occupancy>> {
    let pool = state.db_pool()?;
    get_row(pool, "properties", &path.property_id, "id").await?;

    let filters = json_map(&[
        ("property_id", Value::String(path.property_id.clone())),
        ("status", Value::String("active".to_string())),
    ]);
    let leases =
        list_all_rows(pool, "leases", Some(&filters), "lease_start_date", false).await?;
    let leases: Vec<LeaseRow> = parse_rows("leases", leases);

    Ok(Json(property_occupancy(
        &path.property_id,
        today_or(query.date),
        &leases,
    )))
}

/// Lowercases `property_type` in place and rejects values outside the known
/// set.
fn normalize_property_type(record: &mut Map<String, Value>) -> AppResult<()> {
    let Some(raw) = record.get("property_type").and_then(Value::as_str) else {
        return Ok(());
    };
    let normalized = raw.trim().to_ascii_lowercase();
    if !PROPERTY_TYPES.contains(&normalized.as_str()) {
        return Err(AppError::BadRequest(format!(
            "property_type must be one of: {}.",
            PROPERTY_TYPES.join(", ")
        )));
    }
    record.insert("property_type".to_string(), Value::String(normalized));
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::normalize_property_type;

    #[test]
    fn normalizes_known_property_types() {
        let mut record = Map::new();
        record.insert("property_type".to_string(), json!(" DoubleWide "));
        normalize_property_type(&mut record).expect("known type");
        assert_eq!(record["property_type"], Value::String("doublewide".to_string()));
    }

    #[test]
    fn rejects_unknown_property_types() {
        let mut record = Map::new();
        record.insert("property_type".to_string(), json!("castle"));
        assert!(normalize_property_type(&mut record).is_err());
        assert!(normalize_property_type(&mut Map::new()).is_ok());
    }
}
