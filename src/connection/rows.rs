// pgopstool/src/connection/rows.rs
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};
use tracing::debug;

/// One result row as column name → JSON value.
pub type RowMap = serde_json::Map<String, Value>;

pub fn row_to_map(row: &PgRow) -> RowMap {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), decode_column(row, column.ordinal())))
        .collect()
}

/// Tries the column against the Rust types PostgreSQL values commonly decode to.
fn decode_column(row: &PgRow, index: usize) -> Value {
    if let Ok(val) = row.try_get::<Option<String>, _>(index) {
        return val.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(val) = row.try_get::<Option<bool>, _>(index) {
        return val.map(Value::from).unwrap_or(Value::Null);
    }

    // Handle all integer types
    if let Ok(val) = row.try_get::<Option<i16>, _>(index) {
        return val.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(val) = row.try_get::<Option<i32>, _>(index) {
        return val.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(val) = row.try_get::<Option<i64>, _>(index) {
        return val.map(Value::from).unwrap_or(Value::Null);
    }

    // Handle all float types
    if let Ok(val) = row.try_get::<Option<f32>, _>(index) {
        return val.map(|v| Value::from(v as f64)).unwrap_or(Value::Null);
    }
    if let Ok(val) = row.try_get::<Option<f64>, _>(index) {
        return val.map(Value::from).unwrap_or(Value::Null);
    }

    // numeric keeps its exact textual form
    if let Ok(val) = row.try_get::<Option<sqlx::types::BigDecimal>, _>(index) {
        return val.map(|v| Value::from(v.to_string())).unwrap_or(Value::Null);
    }

    if let Ok(val) = row.try_get::<Option<uuid::Uuid>, _>(index) {
        return val.map(|v| Value::from(v.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(val) = row.try_get::<Option<Value>, _>(index) {
        return val.unwrap_or(Value::Null);
    }

    // Handle timestamps and other date/time types
    if let Ok(val) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index) {
        return val.map(|v| Value::from(v.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(val) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return val.map(|v| Value::from(v.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(val) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return val.map(|v| Value::from(v.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(val) = row.try_get::<Option<chrono::NaiveTime>, _>(index) {
        return val.map(|v| Value::from(v.to_string())).unwrap_or(Value::Null);
    }

    // Arrays
    if let Ok(val) = row.try_get::<Option<Vec<String>>, _>(index) {
        return val.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(val) = row.try_get::<Option<Vec<i32>>, _>(index) {
        return val.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(val) = row.try_get::<Option<Vec<i64>>, _>(index) {
        return val.map(Value::from).unwrap_or(Value::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    debug!(column = index, type_name = %type_name, "unsupported column type, returning null");
    Value::Null
}
