//! Conversion from a type-erased `sqlx::any::AnyRow` into the gateway's
//! tagged [`CellValue`] (§9 "dynamic row payloads"). `sqlx`'s `Any` driver
//! only exposes a handful of concrete Rust types per column, so decoding
//! is a best-effort cascade: the first type that decodes without error
//! wins. Byte strings that are valid UTF-8 are folded into `String`.

use querybase_core::entities::CellValue;
use sqlx::any::AnyRow;
use sqlx::{Column, Row as _, ValueRef as _};

/// Column names in ordinal order, as reported by the driver.
#[must_use]
pub fn column_names(row: &AnyRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Column type names in ordinal order (best-effort; used for display, not
/// for decoding).
#[must_use]
pub fn column_types(row: &AnyRow) -> Vec<String> {
    row.columns()
        .iter()
        .map(|c| c.type_info().to_string())
        .collect()
}

/// Decode column `idx` of `row` into a tagged value.
#[must_use]
pub fn decode_cell(row: &AnyRow, idx: usize) -> CellValue {
    if row
        .try_get_raw(idx)
        .map(|raw| raw.is_null())
        .unwrap_or(false)
    {
        return CellValue::Null;
    }

    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return CellValue::Bool(v);
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return CellValue::Int64(v);
    }
    if let Ok(v) = row.try_get::<i32, _>(idx) {
        return CellValue::Int64(i64::from(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return CellValue::Float64(v);
    }
    if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
        return CellValue::Timestamp(v);
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return CellValue::String(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
        return String::from_utf8(v.clone()).map_or(CellValue::Bytes(v), CellValue::String);
    }

    CellValue::Null
}

/// Decode an entire row into an ordered vector of cells.
#[must_use]
pub fn decode_row(row: &AnyRow) -> Vec<CellValue> {
    (0..row.columns().len()).map(|idx| decode_cell(row, idx)).collect()
}
