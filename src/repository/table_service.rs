use std::future::Future;

use chrono::NaiveDate;
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::AppError;

const ALLOWED_TABLES: &[&str] = &[
    "invoice_details",
    "invoices",
    "late_fee_waivers",
    "leases",
    "payments",
    "properties",
    "tenants",
];

/// Largest page a single read returns. Whole-table reads go through
/// [`list_all_rows`], which keeps paging past it.
pub const MAX_ROWS: i64 = 5000;

pub async fn list_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    let mut query = select_query(table, filters, limit, offset, order_by, ascending)?;
    let rows = query.build().fetch_all(pool).await.map_err(map_db_error)?;
    Ok(read_rows(rows))
}

/// Every matching row, fetched page by page until a short page comes back.
pub async fn list_all_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    collect_pages(MAX_ROWS, |offset| {
        list_rows(pool, table, filters, MAX_ROWS, offset, order_by, ascending)
    })
    .await
}

async fn collect_pages<F, Fut>(page_size: i64, mut fetch_page: F) -> Result<Vec<Value>, AppError>
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<Vec<Value>, AppError>>,
{
    let mut rows = Vec::new();
    loop {
        let offset = i64::try_from(rows.len()).unwrap_or(i64::MAX);
        let page = fetch_page(offset).await?;
        let exhausted = i64::try_from(page.len()).unwrap_or(i64::MAX) < page_size;
        rows.extend(page);
        if exhausted {
            return Ok(rows);
        }
    }
}

pub async fn get_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
    id_field: &str,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    let id_name = validate_identifier(id_field)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE ");
    push_id_filter(&mut query, id_name, row_id);
    query.push(" LIMIT 1");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    read_row(row).ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

pub async fn create_row(
    pool: &sqlx::PgPool,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    let mut query = insert_query(table_name, payload)?;
    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    read_row(row)
        .ok_or_else(|| AppError::Internal(format!("Could not create {table_name} record.")))
}

pub async fn update_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
    payload: &Map<String, Value>,
    id_field: &str,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    let mut query = update_query(table_name, row_id, payload, id_field)?;
    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    read_row(row).ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

/// Inserts `payload`; when a row with the same `conflict_column` value exists
/// the `accumulate` columns are added onto it and the other supplied columns
/// overwrite it.
pub async fn upsert_row(
    pool: &sqlx::PgPool,
    table: &str,
    payload: &Map<String, Value>,
    conflict_column: &str,
    accumulate: &[&str],
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    let mut query = upsert_query(table_name, payload, conflict_column, accumulate)?;
    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    read_row(row)
        .ok_or_else(|| AppError::Internal(format!("Could not write {table_name} record.")))
}

/// Deletes the row and hands back what it looked like.
pub async fn delete_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
    id_field: &str,
) -> Result<Value, AppError> {
    let existing = get_row(pool, table, row_id, id_field).await?;
    let table_name = validate_table(table)?;
    let id_name = validate_identifier(id_field)?;

    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query.push(table_name).push(" t WHERE ");
    push_id_filter(&mut query, id_name, row_id);
    query.build().execute(pool).await.map_err(map_db_error)?;

    Ok(existing)
}

fn select_query(
    table: &str,
    filters: Option<&Map<String, Value>>,
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let table_name = validate_table(table)?;
    let order_name = if order_by.trim().is_empty() {
        "created_at"
    } else {
        validate_identifier(order_by)?
    };
    let direction = if ascending { " ASC" } else { " DESC" };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");

    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter_clause(&mut query, key, value)?;
        }
    }

    // `id` breaks ties so consecutive pages neither skip nor repeat rows.
    query.push(" ORDER BY t.").push(order_name).push(direction);
    if order_name != "id" {
        query.push(", t.id").push(direction);
    }
    query
        .push(" LIMIT ")
        .push_bind(limit.clamp(1, MAX_ROWS))
        .push(" OFFSET ")
        .push_bind(offset.max(0));
    Ok(query)
}

/// Sorted, validated payload keys. Column types are resolved by PostgreSQL
/// from the table definition through `jsonb_populate_record`.
fn payload_columns(payload: &Map<String, Value>) -> Result<Vec<&str>, AppError> {
    let mut keys = payload
        .keys()
        .map(|key| validate_identifier(key))
        .collect::<Result<Vec<_>, _>>()?;
    keys.sort_unstable();
    Ok(keys)
}

/// `INSERT INTO <table> AS t (cols) SELECT r.cols FROM jsonb_populate_record(..) r`
fn insert_select(
    table_name: &str,
    payload: &Map<String, Value>,
) -> Result<(QueryBuilder<'static, Postgres>, Vec<String>), AppError> {
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {table_name} record."
        )));
    }
    let columns = payload_columns(payload)?
        .into_iter()
        .map(ToOwned::to_owned)
        .collect::<Vec<_>>();

    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(table_name).push(" AS t (");
    query.push(columns.join(", "));
    query.push(") SELECT ");
    query.push(
        columns
            .iter()
            .map(|column| format!("r.{column}"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    push_populated_record(&mut query, table_name, payload);
    Ok((query, columns))
}

fn push_populated_record(
    query: &mut QueryBuilder<'static, Postgres>,
    table_name: &str,
    payload: &Map<String, Value>,
) {
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query.push(") r");
}

fn insert_query(
    table_name: &str,
    payload: &Map<String, Value>,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let (mut query, _) = insert_select(table_name, payload)?;
    query.push(" RETURNING row_to_json(t) AS row");
    Ok(query)
}

fn upsert_query(
    table_name: &str,
    payload: &Map<String, Value>,
    conflict_column: &str,
    accumulate: &[&str],
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let conflict_name = validate_identifier(conflict_column)?;
    if !payload.contains_key(conflict_name) {
        return Err(AppError::Internal(format!(
            "Upsert into {table_name} needs a {conflict_name} value."
        )));
    }
    let (mut query, columns) = insert_select(table_name, payload)?;

    let assignments = columns
        .iter()
        .filter(|column| column.as_str() != conflict_name)
        .map(|column| {
            if accumulate.contains(&column.as_str()) {
                format!("{column} = t.{column} + EXCLUDED.{column}")
            } else {
                format!("{column} = COALESCE(EXCLUDED.{column}, t.{column})")
            }
        })
        .collect::<Vec<_>>();
    if assignments.is_empty() {
        return Err(AppError::Internal(format!(
            "Upsert into {table_name} has nothing to update."
        )));
    }

    query
        .push(" ON CONFLICT (")
        .push(conflict_name)
        .push(") DO UPDATE SET ")
        .push(assignments.join(", "))
        .push(" RETURNING row_to_json(t) AS row");
    Ok(query)
}

fn update_query(
    table_name: &str,
    row_id: &str,
    payload: &Map<String, Value>,
    id_field: &str,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let id_name = validate_identifier(id_field)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let columns = payload_columns(payload)?;

    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query.push(table_name).push(" t SET ");
    query.push(
        columns
            .iter()
            .map(|column| format!("{column} = r.{column}"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    push_populated_record(&mut query, table_name, payload);
    query.push(" WHERE ");
    push_id_filter(&mut query, id_name, row_id);
    query.push(" RETURNING row_to_json(t) AS row");
    Ok(query)
}

fn push_id_filter(query: &mut QueryBuilder<'static, Postgres>, id_name: &str, row_id: &str) {
    push_comparison(query, id_name, " = ", filter_value(id_name, row_id));
}

fn read_row(row: Option<PgRow>) -> Option<Value> {
    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
}

fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .collect()
}

fn validate_table(table: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(table)?;
    if ALLOWED_TABLES.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::Internal(format!(
        "Table '{normalized}' is not allowed."
    )))
}

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    let valid = trimmed
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_lowercase() || first == '_')
        && trimmed.chars().all(|character| {
            character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
        });
    if valid {
        Ok(trimmed)
    } else {
        Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )))
    }
}

// ── Filters ──
//
// Keys are `column` (equality) or `column__<op>` with op one of gt, gte, lte,
// ilike, in. Values on `id`/`*_id` columns bind as uuid and on date columns
// as dates when they parse; anything else compares as text.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOperator {
    Eq,
    Gt,
    Gte,
    Lte,
    ILike,
    In,
}

#[derive(Debug, Clone, PartialEq)]
enum FilterValue {
    Uuid(Uuid),
    Date(NaiveDate),
    Number(f64),
    Bool(bool),
    Text(String),
}

fn parse_filter_key(filter_key: &str) -> Result<(&str, FilterOperator), AppError> {
    let (column, operator) = match filter_key.rsplit_once("__") {
        Some((column, "gt")) => (column, FilterOperator::Gt),
        Some((column, "gte")) => (column, FilterOperator::Gte),
        Some((column, "lte")) => (column, FilterOperator::Lte),
        Some((column, "ilike")) => (column, FilterOperator::ILike),
        Some((column, "in")) => (column, FilterOperator::In),
        Some(_) => {
            return Err(AppError::BadRequest(format!(
                "Unsupported filter '{filter_key}'."
            )))
        }
        None => (filter_key, FilterOperator::Eq),
    };
    Ok((validate_identifier(column)?, operator))
}

fn is_uuid_column(column: &str) -> bool {
    column == "id" || column.ends_with("_id")
}

fn is_date_column(column: &str) -> bool {
    column.ends_with("_date") || matches!(column, "period_start" | "period_end")
}

fn filter_value(column: &str, text: &str) -> FilterValue {
    let trimmed = text.trim();
    if is_uuid_column(column) {
        if let Ok(id) = Uuid::parse_str(trimmed) {
            return FilterValue::Uuid(id);
        }
    }
    if is_date_column(column) {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return FilterValue::Date(date);
        }
    }
    FilterValue::Text(trimmed.to_string())
}

fn scalar_filter_value(column: &str, value: &Value) -> Option<FilterValue> {
    match value {
        Value::String(text) => Some(filter_value(column, text)),
        Value::Number(number) => number.as_f64().map(FilterValue::Number),
        Value::Bool(flag) => Some(FilterValue::Bool(*flag)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn push_filter_clause(
    query: &mut QueryBuilder<'static, Postgres>,
    filter_key: &str,
    value: &Value,
) -> Result<(), AppError> {
    let (column, operator) = parse_filter_key(filter_key)?;
    if value.is_null() {
        return Ok(());
    }

    if operator == FilterOperator::In {
        let Value::Array(items) = value else {
            return Err(AppError::BadRequest(format!(
                "Filter '{filter_key}' expects a list."
            )));
        };
        query.push(" AND ");
        push_in_filter(query, column, items);
        return Ok(());
    }

    let filter = scalar_filter_value(column, value).ok_or_else(|| {
        AppError::BadRequest(format!("Filter '{filter_key}' expects a single value."))
    })?;
    query.push(" AND ");
    match operator {
        FilterOperator::Eq | FilterOperator::In => push_comparison(query, column, " = ", filter),
        FilterOperator::Gt => push_comparison(query, column, " > ", filter),
        FilterOperator::Gte => push_comparison(query, column, " >= ", filter),
        FilterOperator::Lte => push_comparison(query, column, " <= ", filter),
        FilterOperator::ILike => {
            let pattern = match filter {
                FilterValue::Text(text) => text,
                other => filter_text(&other),
            };
            query
                .push("t.")
                .push(column)
                .push("::text ILIKE ")
                .push_bind(pattern);
        }
    }
    Ok(())
}

fn filter_text(value: &FilterValue) -> String {
    match value {
        FilterValue::Uuid(id) => id.to_string(),
        FilterValue::Date(date) => date.to_string(),
        FilterValue::Number(number) => number.to_string(),
        FilterValue::Bool(flag) => flag.to_string(),
        FilterValue::Text(text) => text.clone(),
    }
}

fn push_comparison(
    query: &mut QueryBuilder<'static, Postgres>,
    column: &str,
    sql_operator: &str,
    value: FilterValue,
) {
    query.push("t.").push(column);
    match value {
        FilterValue::Uuid(id) => {
            query.push(sql_operator).push_bind(id);
        }
        FilterValue::Date(date) => {
            query.push(sql_operator).push_bind(date);
        }
        FilterValue::Number(number) => {
            query.push(sql_operator).push_bind(number);
        }
        FilterValue::Bool(flag) => {
            query.push(sql_operator).push_bind(flag);
        }
        FilterValue::Text(text) => {
            query.push("::text").push(sql_operator).push_bind(text);
        }
    }
}

/// An empty list matches nothing.
fn push_in_filter(query: &mut QueryBuilder<'static, Postgres>, column: &str, items: &[Value]) {
    let texts = items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .collect::<Vec<_>>();
    if texts.is_empty() {
        query.push("FALSE");
        return;
    }

    let ids = texts
        .iter()
        .map(|text| Uuid::parse_str(text))
        .collect::<Result<Vec<_>, _>>();
    query.push("t.").push(column);
    match ids {
        Ok(ids) if is_uuid_column(column) => {
            query.push(" = ANY(").push_bind(ids).push(")");
        }
        _ => {
            query.push("::text = ANY(").push_bind(texts).push(")");
        }
    }
}

/// Unique violations surface as 409; every other store failure is a
/// dependency error carrying the store's code and message.
fn map_db_error(error: sqlx::Error) -> AppError {
    tracing::error!(db_error = %error, "Database query failed");

    match &error {
        sqlx::Error::Database(db_error) => {
            let code = db_error.code().map(|code| code.to_string());
            if code.as_deref() == Some("23505") {
                return AppError::Conflict(
                    "Duplicate value violates a unique constraint.".to_string(),
                );
            }
            match code {
                Some(code) => AppError::Dependency(format!(
                    "Database operation failed ({code}): {}",
                    db_error.message()
                )),
                None => AppError::Dependency(format!(
                    "Database operation failed: {}",
                    db_error.message()
                )),
            }
        }
        sqlx::Error::RowNotFound => AppError::NotFound("Record not found.".to_string()),
        other => AppError::Dependency(format!("Database operation failed: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::{json, Map, Value};

    use super::{
        collect_pages, insert_query, parse_filter_key, select_query, update_query,
        upsert_query, validate_table, FilterOperator,
    };
    use crate::error::AppError;

    fn filters(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn rejects_tables_outside_the_ledger() {
        assert!(validate_table("invoices").is_ok());
        assert!(validate_table("invoice_details").is_ok());
        assert!(matches!(
            validate_table("app_users"),
            Err(AppError::Internal(_))
        ));
        assert!(matches!(
            validate_table("invoices; drop table leases"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn parses_filter_suffixes() {
        assert_eq!(
            parse_filter_key("due_date__lte").expect("key"),
            ("due_date", FilterOperator::Lte)
        );
        assert_eq!(
            parse_filter_key("lease_id__in").expect("key"),
            ("lease_id", FilterOperator::In)
        );
        assert_eq!(
            parse_filter_key("city__ilike").expect("key"),
            ("city", FilterOperator::ILike)
        );
        assert_eq!(
            parse_filter_key("late_fee_amount").expect("key"),
            ("late_fee_amount", FilterOperator::Eq)
        );
        assert!(parse_filter_key("due_date__lt").is_err());
    }

    #[test]
    fn select_sql_binds_filters() {
        let filters = filters(json!({
            "status": "OPEN",
            "due_date__lte": "2026-04-30",
            "balance_due__gt": 0,
            "lease_id__in": [
                "550e8400-e29b-41d4-a716-446655440000",
                "6ba7b810-9dad-11d1-80b4-00c04fd430c8"
            ],
            "notes": null
        }));
        let query = select_query("invoices", Some(&filters), 20_000, -4, "due_date", true)
            .expect("query");
        let sql = query.sql();
        assert!(sql.starts_with("SELECT row_to_json(t) AS row FROM invoices t WHERE 1=1"));
        assert!(sql.contains("t.status::text = $"), "{sql}");
        assert!(sql.contains("t.due_date <= $"), "{sql}");
        assert!(sql.contains("t.balance_due > $"), "{sql}");
        assert!(sql.contains("t.lease_id = ANY($"), "{sql}");
        assert!(!sql.contains("notes"), "{sql}");
        assert!(
            sql.contains("ORDER BY t.due_date ASC, t.id ASC LIMIT $"),
            "{sql}"
        );
    }

    #[test]
    fn empty_in_filter_matches_nothing() {
        let filters = filters(json!({"lease_id__in": []}));
        let query = select_query("payments", Some(&filters), 10, 0, "", false).expect("query");
        assert!(query.sql().contains("WHERE 1=1 AND FALSE"), "{}", query.sql());
        assert!(query.sql().contains("ORDER BY t.created_at DESC, t.id DESC"));
    }

    #[test]
    fn non_uuid_ids_compare_as_text() {
        let filters = filters(json!({"id__in": ["inv-1", "inv-2"], "lease_id": "lease-1"}));
        let query = select_query("invoices", Some(&filters), 10, 0, "id", true).expect("query");
        let sql = query.sql();
        assert!(sql.contains("t.id::text = ANY($"), "{sql}");
        assert!(sql.contains("t.lease_id::text = $"), "{sql}");
        assert!(sql.contains("ORDER BY t.id ASC LIMIT"), "{sql}");
    }

    #[test]
    fn malformed_filter_values_are_rejected() {
        let scalar_in = filters(json!({"lease_id__in": "lease-1"}));
        assert!(matches!(
            select_query("invoices", Some(&scalar_in), 10, 0, "", true),
            Err(AppError::BadRequest(_))
        ));
        let list_eq = filters(json!({"status": ["OPEN"]}));
        assert!(matches!(
            select_query("invoices", Some(&list_eq), 10, 0, "", true),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn insert_sql_uses_jsonb_populate_record() {
        let payload = filters(json!({
            "lease_id": "550e8400-e29b-41d4-a716-446655440000",
            "due_date": "2026-05-01",
            "amount_rent": 950
        }));
        let query = insert_query("invoices", &payload).expect("query");
        let sql = query.sql();
        assert!(
            sql.contains("INSERT INTO invoices AS t (amount_rent, due_date, lease_id) SELECT r.amount_rent, r.due_date, r.lease_id"),
            "{sql}"
        );
        assert!(sql.contains("FROM jsonb_populate_record(NULL::invoices, $1) r"), "{sql}");
        assert!(sql.ends_with("RETURNING row_to_json(t) AS row"), "{sql}");
    }

    #[test]
    fn upsert_adds_accumulated_columns_on_conflict() {
        let payload = filters(json!({
            "invoice_id": "550e8400-e29b-41d4-a716-446655440000",
            "lease_id": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
            "amount_waived": 25,
            "reason": null
        }));
        let query = upsert_query("late_fee_waivers", &payload, "invoice_id", &["amount_waived"])
            .expect("query");
        let sql = query.sql();
        assert!(sql.contains(" ON CONFLICT (invoice_id) DO UPDATE SET "), "{sql}");
        assert!(
            sql.contains("amount_waived = t.amount_waived + EXCLUDED.amount_waived"),
            "{sql}"
        );
        assert!(
            sql.contains("reason = COALESCE(EXCLUDED.reason, t.reason)"),
            "{sql}"
        );
        assert!(!sql.contains("invoice_id = "), "{sql}");

        let missing_key = filters(json!({"amount_waived": 25}));
        assert!(upsert_query("late_fee_waivers", &missing_key, "invoice_id", &[]).is_err());
    }

    #[test]
    fn update_sql_sets_columns_from_record() {
        let payload = filters(json!({"balance_due": 0, "status": "PAID"}));
        let query = update_query(
            "invoices",
            "550e8400-e29b-41d4-a716-446655440000",
            &payload,
            "id",
        )
        .expect("query");
        let sql = query.sql();
        assert!(sql.contains("UPDATE invoices t SET balance_due = r.balance_due, status = r.status"), "{sql}");
        assert!(sql.contains("WHERE t.id = $2"), "{sql}");
    }

    #[test]
    fn empty_payloads_are_rejected() {
        assert!(matches!(
            insert_query("tenants", &Map::new()),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            update_query("tenants", "x", &Map::new(), "id"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn rejects_unsafe_payload_columns() {
        let payload = filters(json!({"amount_rent; --": 1}));
        assert!(matches!(
            insert_query("invoices", &payload),
            Err(AppError::BadRequest(_))
        ));
    }

    fn numbered(range: std::ops::Range<usize>) -> Vec<Value> {
        range.map(|number| json!({ "n": number })).collect()
    }

    #[tokio::test]
    async fn pages_until_a_short_page() {
        let offsets = RefCell::new(Vec::new());
        let rows = collect_pages(3, |offset| {
            offsets.borrow_mut().push(offset);
            let start = usize::try_from(offset).unwrap_or_default();
            let end = (start + 3).min(7);
            async move { Ok(numbered(start..end)) }
        })
        .await
        .expect("rows");
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[6], json!({ "n": 6 }));
        assert_eq!(*offsets.borrow(), vec![0, 3, 6]);
    }

    #[tokio::test]
    async fn exact_multiple_reads_one_empty_page() {
        let calls = RefCell::new(0);
        let rows = collect_pages(2, |offset| {
            *calls.borrow_mut() += 1;
            let start = usize::try_from(offset).unwrap_or_default();
            async move { Ok(numbered(start..(start + 2).min(4))) }
        })
        .await
        .expect("rows");
        assert_eq!(rows.len(), 4);
        assert_eq!(*calls.borrow(), 3);
    }

    #[tokio::test]
    async fn page_errors_abort_the_read() {
        let result = collect_pages(2, |offset| async move {
            if offset == 0 {
                Ok(numbered(0..2))
            } else {
                Err(AppError::Dependency("connection reset".to_string()))
            }
        })
        .await;
        assert!(matches!(result, Err(AppError::Dependency(_))));
    }
}
