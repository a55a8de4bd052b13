use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::AppResult,
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    schemas::{
        clamp_limit_in_range, remove_nulls, serialize_to_map, validate_input, CreateTenantInput,
        TenantPath, TenantsQuery, UpdateTenantInput,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/tenants",
            axum::routing::get(list_tenants).post(create_tenant),
        )
        .route(
            "/tenants/{tenant_id}",
            axum::routing::get(get_tenant)
                .patch(update_tenant)
                .delete(delete_tenant),
        )
}

async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<TenantsQuery>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;

    let mut filters = Map::new();
    if let Some(is_active) = query.is_active {
        filters.insert("is_active".to_string(), Value::Bool(is_active));
    }
    let rows = list_rows(
        pool,
        "tenants",
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 1000),
        0,
        "last_name",
        true,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_tenant(
    State(state): State<AppState>,
    Json(payload): Json<CreateTenantInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let record = remove_nulls(serialize_to_map(&payload));

    let pool = state.db_pool()?;
    let created = create_row(pool, "tenants", &record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    Ok(Json(get_row(pool, "tenants", &path.tenant_id, "id").await?))
}

async fn update_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
    Json(payload): Json<UpdateTenantInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let patch = remove_nulls(serialize_to_map(&payload));

    let pool = state.db_pool()?;
    let updated = update_row(pool, "tenants", &path.tenant_id, &patch, "id").await?;
    Ok(Json(updated))
}

async fn delete_tenant(
    State(state): State<AppState>,
    Path(path): Path<TenantPath>,
) -> AppResult<Json<Value>> {
    let pool = state.db_pool()?;
    let deleted = delete_row(pool, "tenants", &path.tenant_id, "id").await?;
    tracing::info!(tenant_id = %path.tenant_id, "Tenant deleted");
    Ok(Json(deleted))
}
