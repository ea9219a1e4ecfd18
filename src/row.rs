//! Buffered result rows.
//!
//! A `RowSet` is the materialized outcome of one fetch: ordered column
//! names plus rows decoded to JSON maps. It is what the result mapper
//! consumes and what the query cache serializes.
//!
//! Column decoding classifies the reported column type into a logical
//! category first, then applies a driver-specific decoder. This keeps the
//! classification in one place while allowing MySQL and SQLite to differ
//! where their type systems do.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// One fetch result: column order plus rows as field-name -> value maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
}

impl RowSet {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row, if any.
    pub fn first(&self) -> Option<&serde_json::Map<String, JsonValue>> {
        self.rows.first()
    }

    pub(crate) fn from_mysql(rows: Vec<MySqlRow>) -> Self {
        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => Vec::new(),
        };
        let rows = rows.iter().map(mysql::decode_row).collect();
        Self { columns, rows }
    }

    pub(crate) fn from_sqlite(rows: Vec<SqliteRow>) -> Self {
        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => Vec::new(),
        };
        let rows = rows.iter().map(sqlite::decode_row).collect();
        Self { columns, rows }
    }
}

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Text,
}

fn categorize_type(type_name: &str, sqlite: bool) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/numeric first, "numeric" would otherwise match nothing below.
    // SQLite's NUMERIC affinity is a float.
    if lower.contains("decimal") || lower.contains("numeric") {
        return if sqlite {
            TypeCategory::Float
        } else {
            TypeCategory::Decimal
        };
    }
    if lower.contains("int") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }
    if lower.contains("blob") || lower.contains("binary") {
        return TypeCategory::Binary;
    }
    TypeCategory::Text
}

/// Decode binary data: UTF-8 text when it is valid, base64 otherwise.
fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

/// Raw DECIMAL/NUMERIC value kept as its exact server-side string.
struct DecimalText(String);

impl Type<sqlx::MySql> for DecimalText {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for DecimalText {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(DecimalText(s.to_string()))
    }
}

mod mysql {
    use super::*;

    pub fn decode_row(row: &MySqlRow) -> serde_json::Map<String, JsonValue> {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), false);
                (col.name().to_string(), decode_column(row, idx, category))
            })
            .collect()
    }

    fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => match row.try_get::<Option<DecimalText>, _>(idx) {
                Ok(Some(v)) => JsonValue::String(v.0),
                _ => JsonValue::Null,
            },
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map(|v| decode_binary_value(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Text => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        // Unsigned BIGINT does not fit i64
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return serde_json::Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return serde_json::Number::from_f64(v as f64)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string()));
        }
        JsonValue::Null
    }
}

mod sqlite {
    use super::*;

    pub fn decode_row(row: &SqliteRow) -> serde_json::Map<String, JsonValue> {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), true);
                (col.name().to_string(), decode_column(row, idx, category))
            })
            .collect()
    }

    fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map(|v| JsonValue::Number(v.into()))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            TypeCategory::Float | TypeCategory::Decimal => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map(|v| {
                    serde_json::Number::from_f64(v)
                        .map(JsonValue::Number)
                        .unwrap_or_else(|| JsonValue::String(v.to_string()))
                })
                .unwrap_or(JsonValue::Null),
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map(|v| decode_binary_value(&v))
                .unwrap_or(JsonValue::Null),
            TypeCategory::Text => row
                .try_get::<Option<String>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type() {
        assert_eq!(categorize_type("INT", false), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT", false), TypeCategory::Integer);
        assert_eq!(categorize_type("TINYINT", false), TypeCategory::Integer);
        assert_eq!(categorize_type("BOOLEAN", false), TypeCategory::Boolean);
        assert_eq!(categorize_type("DOUBLE", false), TypeCategory::Float);
        assert_eq!(categorize_type("DECIMAL", false), TypeCategory::Decimal);
        assert_eq!(categorize_type("NUMERIC", true), TypeCategory::Float);
        assert_eq!(categorize_type("BLOB", false), TypeCategory::Binary);
        assert_eq!(categorize_type("VARCHAR", false), TypeCategory::Text);
    }

    #[test]
    fn test_decode_binary_value() {
        assert_eq!(
            decode_binary_value(b"hello"),
            JsonValue::String("hello".to_string())
        );
        assert_eq!(
            decode_binary_value(&[0xFF, 0xFE, 0x00, 0x01]),
            JsonValue::String("//4AAQ==".to_string())
        );
    }

    #[test]
    fn test_rowset_serde_round_trip() {
        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), JsonValue::Number(1.into()));
        row.insert("name".to_string(), JsonValue::String("ada".to_string()));
        let set = RowSet {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![row],
        };

        let payload = serde_json::to_string(&set).unwrap();
        let back: RowSet = serde_json::from_str(&payload).unwrap();
        assert_eq!(back, set);
        assert_eq!(back.len(), 1);
        assert!(!back.is_empty());
    }
}
