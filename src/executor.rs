//! Statement execution.
//!
//! `StatementExecutor` is the base of the read-path decorator stack
//! (`CachedFetch` -> `OverrideFetch` -> executor) and the whole of the
//! write path. It rewrites named placeholders to positional ones, infers
//! bind types from the value, notifies observers, feeds the profiler, and
//! records the affected-row count of the last successful statement.
//!
//! Failures surface as query errors with the driver diagnostic untouched;
//! nothing here retries.

use crate::cache::CachePolicy;
use crate::error::{DbalError, DbalResult};
use crate::hooks::ObserverSet;
use crate::profiler::Profiler;
use crate::registry::DbPool;
use crate::row::RowSet;
use crate::value::{Params, SqlValue};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

/// Outcome of one read through the fetch stack. `live` distinguishes a
/// real round trip from a cache or override hit, which upper layers must
/// not store or re-announce.
#[derive(Debug, Clone)]
pub(crate) struct Fetched {
    pub rows: RowSet,
    pub live: bool,
}

/// The read capability every layer of the fetch stack implements.
#[allow(async_fn_in_trait)]
pub(crate) trait Fetch {
    async fn fetch(&self, sql: &str, params: &Params, policy: &CachePolicy) -> DbalResult<Fetched>;
}

/// Executes statements against one connection pool.
#[derive(Debug, Clone)]
pub(crate) struct StatementExecutor {
    pool: DbPool,
    profiler: Arc<Profiler>,
    observers: ObserverSet,
    affected_rows: Arc<AtomicU64>,
    last_insert_id: Arc<AtomicI64>,
}

impl StatementExecutor {
    pub(crate) fn new(pool: DbPool, profiler: Arc<Profiler>, observers: ObserverSet) -> Self {
        Self {
            pool,
            profiler,
            observers,
            affected_rows: Arc::new(AtomicU64::new(0)),
            last_insert_id: Arc::new(AtomicI64::new(0)),
        }
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Rows affected by the last successful statement. Unchanged when a
    /// statement fails.
    pub(crate) fn affected_rows(&self) -> u64 {
        self.affected_rows.load(Ordering::Relaxed)
    }

    /// Auto-generated id of the last successful insert.
    pub(crate) fn last_insert_id(&self) -> i64 {
        self.last_insert_id.load(Ordering::Relaxed)
    }

    /// Execute a write statement and return the affected-row count.
    pub(crate) async fn execute(&self, sql: &str, params: &Params) -> DbalResult<u64> {
        let (sql, values) = resolve_params(sql, params)?;
        self.observers.notify_before(&sql, params);

        debug!(sql = %sql, params = params.len(), "Executing statement");
        let start = Instant::now();

        // With nothing to bind, run over the raw text protocol; statements
        // like SET or REPLACE batches are not always server-preparable.
        let (affected, insert_id) = match &self.pool {
            DbPool::MySql(pool) => {
                let done = if values.is_empty() {
                    use sqlx::Executor;
                    pool.execute(sql.as_str()).await.map_err(DbalError::from)?
                } else {
                    let mut query = sqlx::query(&sql);
                    for value in &values {
                        query = bind_mysql(query, value);
                    }
                    query.execute(pool).await.map_err(DbalError::from)?
                };
                (done.rows_affected(), done.last_insert_id() as i64)
            }
            DbPool::Sqlite(pool) => {
                let done = if values.is_empty() {
                    use sqlx::Executor;
                    pool.execute(sql.as_str()).await.map_err(DbalError::from)?
                } else {
                    let mut query = sqlx::query(&sql);
                    for value in &values {
                        query = bind_sqlite(query, value);
                    }
                    query.execute(pool).await.map_err(DbalError::from)?
                };
                (done.rows_affected(), done.last_insert_rowid())
            }
        };

        self.profiler.record(&sql, params, start.elapsed());
        self.affected_rows.store(affected, Ordering::Relaxed);
        if insert_id != 0 {
            self.last_insert_id.store(insert_id, Ordering::Relaxed);
        }
        Ok(affected)
    }
}

impl Fetch for StatementExecutor {
    async fn fetch(&self, sql: &str, params: &Params, _policy: &CachePolicy) -> DbalResult<Fetched> {
        let (sql, values) = resolve_params(sql, params)?;
        self.observers.notify_before(&sql, params);

        debug!(sql = %sql, params = params.len(), "Executing query");
        let start = Instant::now();

        let rows = match &self.pool {
            DbPool::MySql(pool) => {
                let rows = if values.is_empty() {
                    use sqlx::Executor;
                    pool.fetch_all(sql.as_str()).await.map_err(DbalError::from)?
                } else {
                    let mut query = sqlx::query(&sql);
                    for value in &values {
                        query = bind_mysql(query, value);
                    }
                    query.fetch_all(pool).await.map_err(DbalError::from)?
                };
                RowSet::from_mysql(rows)
            }
            DbPool::Sqlite(pool) => {
                let rows = if values.is_empty() {
                    use sqlx::Executor;
                    pool.fetch_all(sql.as_str()).await.map_err(DbalError::from)?
                } else {
                    let mut query = sqlx::query(&sql);
                    for value in &values {
                        query = bind_sqlite(query, value);
                    }
                    query.fetch_all(pool).await.map_err(DbalError::from)?
                };
                RowSet::from_sqlite(rows)
            }
        };

        self.profiler.record(&sql, params, start.elapsed());
        self.affected_rows.store(rows.len() as u64, Ordering::Relaxed);
        self.observers.notify_after(&sql, params, &rows);
        Ok(Fetched { rows, live: true })
    }
}

/// Resolve parameters into (positional SQL, ordered values). Positional
/// parameters pass through untouched; named parameters are rewritten by
/// [`expand_named`].
fn resolve_params(sql: &str, params: &Params) -> DbalResult<(String, Vec<SqlValue>)> {
    match params {
        Params::None => Ok((sql.to_string(), Vec::new())),
        Params::Positional(values) => Ok((sql.to_string(), values.clone())),
        Params::Named(named) => expand_named(sql, named),
    }
}

/// Rewrite `:name` placeholders to `?` in statement-text order and build
/// the matching value sequence. String literals, quoted identifiers and
/// comments are left untouched. A placeholder with no bound value is an
/// input error.
fn expand_named(sql: &str, named: &[(String, SqlValue)]) -> DbalResult<(String, Vec<SqlValue>)> {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        match ch {
            '\'' | '"' | '`' => {
                out.push(ch);
                copy_quoted(&mut chars, &mut out, ch);
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                out.push(ch);
                copy_until_newline(&mut chars, &mut out);
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                out.push(ch);
                copy_block_comment(&mut chars, &mut out);
            }
            ':' if matches!(chars.peek(), Some((_, ':'))) => {
                // `::` is never a placeholder
                out.push(ch);
                if let Some((_, next)) = chars.next() {
                    out.push(next);
                }
            }
            ':' => {
                let mut name = String::new();
                while let Some((_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    out.push(ch);
                    continue;
                }
                let value = named
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        DbalError::invalid_input(format!("No value bound for parameter :{}", name))
                    })?;
                values.push(value);
                out.push('?');
            }
            _ => out.push(ch),
        }
    }

    Ok((out, values))
}

fn copy_quoted<I>(chars: &mut std::iter::Peekable<I>, out: &mut String, quote: char)
where
    I: Iterator<Item = (usize, char)>,
{
    while let Some((_, ch)) = chars.next() {
        out.push(ch);
        if ch == '\\' && quote != '`' {
            if let Some((_, escaped)) = chars.next() {
                out.push(escaped);
            }
            continue;
        }
        if ch == quote {
            // Doubled quote stays inside the literal
            match chars.peek() {
                Some((_, c)) if *c == quote => {
                    out.push(quote);
                    chars.next();
                }
                _ => return,
            }
        }
    }
}

fn copy_until_newline<I>(chars: &mut std::iter::Peekable<I>, out: &mut String)
where
    I: Iterator<Item = (usize, char)>,
{
    for (_, ch) in chars.by_ref() {
        out.push(ch);
        if ch == '\n' {
            return;
        }
    }
}

fn copy_block_comment<I>(chars: &mut std::iter::Peekable<I>, out: &mut String)
where
    I: Iterator<Item = (usize, char)>,
{
    let mut prev = ' ';
    for (_, ch) in chars.by_ref() {
        out.push(ch);
        if prev == '*' && ch == '/' {
            return;
        }
        prev = ch;
    }
}

/// Bind one value to a MySQL query. Integers and booleans bind natively;
/// floats bind as their decimal rendering, everything else as a string.
fn bind_mysql<'q>(
    query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(v.to_string()),
        SqlValue::Text(v) => query.bind(v.as_str()),
    }
}

/// Bind one value to a SQLite query.
fn bind_sqlite<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(v.to_string()),
        SqlValue::Text(v) => query.bind(v.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(pairs: &[(&str, i64)]) -> Vec<(String, SqlValue)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), SqlValue::Int(*v)))
            .collect()
    }

    #[test]
    fn test_expand_named_basic() {
        let (sql, values) = expand_named(
            "SELECT * FROM account WHERE id = :id AND score > :score",
            &named(&[("id", 7), ("score", 50)]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM account WHERE id = ? AND score > ?");
        assert_eq!(values, vec![SqlValue::Int(7), SqlValue::Int(50)]);
    }

    #[test]
    fn test_expand_named_repeated_placeholder() {
        let (sql, values) = expand_named(
            "SELECT :id, :id",
            &named(&[("id", 1)]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT ?, ?");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_expand_named_statement_text_order() {
        let (_, values) = expand_named(
            "UPDATE t SET b = :b, a = :a WHERE id = :id",
            &named(&[("a", 1), ("b", 2), ("id", 3)]),
        )
        .unwrap();
        assert_eq!(
            values,
            vec![SqlValue::Int(2), SqlValue::Int(1), SqlValue::Int(3)]
        );
    }

    #[test]
    fn test_expand_named_skips_string_literals() {
        let (sql, values) = expand_named(
            "SELECT ':not_a_param' FROM t WHERE id = :id",
            &named(&[("id", 1)]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT ':not_a_param' FROM t WHERE id = ?");
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_expand_named_skips_comments_and_identifiers() {
        let (sql, values) = expand_named(
            "SELECT `col:on` FROM t -- :line\n WHERE /* :block */ id = :id",
            &named(&[("id", 4)]),
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT `col:on` FROM t -- :line\n WHERE /* :block */ id = ?"
        );
        assert_eq!(values, vec![SqlValue::Int(4)]);
    }

    #[test]
    fn test_expand_named_double_colon_passthrough() {
        let (sql, values) = expand_named("SELECT a::text FROM t", &[]).unwrap();
        assert_eq!(sql, "SELECT a::text FROM t");
        assert!(values.is_empty());
    }

    #[test]
    fn test_expand_named_missing_binding() {
        let err = expand_named("SELECT :missing", &[]).unwrap_err();
        assert!(matches!(err, DbalError::InvalidInput { .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_expand_named_escaped_quote_in_literal() {
        let (sql, values) = expand_named(
            "SELECT 'it''s :ok' WHERE id = :id",
            &named(&[("id", 2)]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT 'it''s :ok' WHERE id = ?");
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_resolve_positional_passthrough() {
        let params = Params::positional([1i64, 2]);
        let (sql, values) = resolve_params("SELECT ? + ?", &params).unwrap();
        assert_eq!(sql, "SELECT ? + ?");
        assert_eq!(values.len(), 2);
    }
}
