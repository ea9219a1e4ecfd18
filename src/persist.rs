//! SQL construction for object persistence.
//!
//! Builders for the INSERT/UPDATE/batched-REPLACE statements issued by the
//! connection's persistence methods, plus the dialect-aware literal
//! escaping used wherever values are inlined instead of bound (batch
//! REPLACE and IN-clause building).

use crate::config::Driver;
use crate::entity::Entity;
use crate::error::{DbalError, DbalResult};
use crate::value::SqlValue;

/// Default entity count per batched REPLACE statement.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// How an INSERT is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    #[default]
    Standard,
    /// `INSERT DELAYED` — MySQL only; plain INSERT elsewhere.
    Delayed,
}

/// Escape a string for inlining into a SQL literal, without the
/// surrounding quotes.
///
/// MySQL applies the client library's backslash rules; SQLite doubles
/// single quotes.
pub fn escape_literal(driver: Driver, raw: &str) -> String {
    match driver {
        Driver::MySql => {
            let mut out = String::with_capacity(raw.len());
            for ch in raw.chars() {
                match ch {
                    '\0' => out.push_str("\\0"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\x1a' => out.push_str("\\Z"),
                    '\\' => out.push_str("\\\\"),
                    '\'' => out.push_str("\\'"),
                    '"' => out.push_str("\\\""),
                    _ => out.push(ch),
                }
            }
            out
        }
        Driver::Sqlite => raw.replace('\'', "''"),
    }
}

/// Join values into the body of a SQL `IN (...)` clause: each value
/// escaped and single-quoted, comma separated. Empty input yields an
/// empty string.
pub fn merge_in_clause<S: AsRef<str>>(driver: Driver, values: &[S]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", escape_literal(driver, v.as_ref())))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render one value as an inline literal.
fn render_literal(driver: Driver, value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Text(s) => format!("'{}'", escape_literal(driver, s)),
    }
}

/// `INSERT [DELAYED] INTO `table` (cols...) VALUES (:cols...)`.
pub(crate) fn build_insert_sql(
    driver: Driver,
    table: &str,
    fields: &[&'static str],
    mode: InsertMode,
) -> String {
    let delayed = match (mode, driver) {
        (InsertMode::Delayed, Driver::MySql) => " DELAYED",
        _ => "",
    };
    let columns = fields
        .iter()
        .map(|f| format!("`{}`", f))
        .collect::<Vec<_>>()
        .join(",");
    let values = fields
        .iter()
        .map(|f| format!(":{}", f))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "INSERT{} INTO `{}` ({}) VALUES ({})",
        delayed, table, columns, values
    )
}

/// `UPDATE [LOW_PRIORITY] `table` SET dirty=:dirty,... WHERE pk=:pk`.
pub(crate) fn build_update_sql(
    driver: Driver,
    table: &str,
    dirty: &[&'static str],
    primary_key: &str,
    low_priority: bool,
) -> String {
    let low_priority = match (low_priority, driver) {
        (true, Driver::MySql) => " LOW_PRIORITY",
        _ => "",
    };
    let assignments = dirty
        .iter()
        .map(|f| format!("`{}`=:{}", f, f))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "UPDATE{} `{}` SET {} WHERE {}=:{}",
        low_priority, table, assignments, primary_key, primary_key
    )
}

/// Build one `REPLACE INTO` statement per batch of up to `batch_size`
/// entities, inlining escaped literal values for throughput. A batch
/// flushes when it fills or when the entities are exhausted.
pub(crate) fn build_replace_batches<T: Entity>(
    driver: Driver,
    table: &str,
    entities: &[T],
    batch_size: usize,
) -> DbalResult<Vec<String>> {
    if entities.is_empty() {
        return Err(DbalError::invalid_input(
            "batch insert requires at least one entity",
        ));
    }
    if batch_size == 0 {
        return Err(DbalError::invalid_input("batch size must be at least 1"));
    }
    let fields = T::field_names();
    if fields.is_empty() {
        return Err(DbalError::invalid_input(
            "entity type declares no fields",
        ));
    }

    let columns = fields
        .iter()
        .map(|f| format!("`{}`", f))
        .collect::<Vec<_>>()
        .join(",");
    let prefix = format!("REPLACE INTO `{}` ({}) VALUES ", table, columns);

    let mut statements = Vec::with_capacity(entities.len().div_ceil(batch_size));
    for chunk in entities.chunks(batch_size) {
        let tuples = chunk
            .iter()
            .map(|entity| {
                let values = fields
                    .iter()
                    .map(|f| render_literal(driver, &entity.get(f)))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("({})", values)
            })
            .collect::<Vec<_>>()
            .join(",");
        statements.push(format!("{}{}", prefix, tuples));
    }
    Ok(statements)
}
