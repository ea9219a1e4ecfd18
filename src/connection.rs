//! The caller-facing connection façade.
//!
//! A `Connection` bundles one pooled database endpoint with the decorated
//! read path (cache -> override -> executor), the write path, the profiler
//! and the persistence helpers. Instances are created and shared by the
//! [`ConnectionRegistry`](crate::registry::ConnectionRegistry); callers
//! receive them as `Arc<Connection>`.

use crate::cache::{CachePolicy, CachedFetch, QueryCache};
use crate::config::{ConnectionParams, Driver};
use crate::entity::{Entity, Tracked};
use crate::error::{DbalError, DbalResult};
use crate::executor::{Fetch, StatementExecutor};
use crate::hooks::{ObserverSet, OverrideFetch, OverrideHook, QueryObserver};
use crate::mapper;
use crate::persist::{self, InsertMode, DEFAULT_BATCH_SIZE};
use crate::profiler::Profiler;
use crate::registry::DbPool;
use crate::row::RowSet;
use crate::value::Params;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result of [`Connection::update_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Every field matched the snapshot; no statement was issued.
    Unchanged,
    /// An UPDATE ran, affecting this many rows.
    Applied(u64),
}

impl UpdateOutcome {
    /// Rows affected; zero for the no-op case.
    pub fn rows_affected(&self) -> u64 {
        match self {
            Self::Unchanged => 0,
            Self::Applied(n) => *n,
        }
    }
}

/// One live database connection and everything that hangs off it.
pub struct Connection {
    params: ConnectionParams,
    executor: StatementExecutor,
    reader: CachedFetch<OverrideFetch<StatementExecutor>>,
    profiler: Arc<Profiler>,
    observers: ObserverSet,
    use_cache: Arc<AtomicBool>,
}

impl Connection {
    pub(crate) fn new(
        params: ConnectionParams,
        pool: DbPool,
        cache: Option<Arc<dyn QueryCache>>,
        override_hook: Option<Arc<dyn OverrideHook>>,
    ) -> Self {
        let profiler = Arc::new(Profiler::new(params.profiler_enabled));
        let observers = ObserverSet::default();
        let executor = StatementExecutor::new(pool, Arc::clone(&profiler), observers.clone());
        // Caching is off until the caller opts in; the debug bypass is
        // baked in for the connection's lifetime.
        let use_cache = Arc::new(AtomicBool::new(false));
        let reader = CachedFetch::new(
            OverrideFetch::new(executor.clone(), override_hook),
            cache,
            Arc::clone(&use_cache),
            params.debug_mode,
            observers.clone(),
        );
        Self {
            params,
            executor,
            reader,
            profiler,
            observers,
            use_cache,
        }
    }

    /// The parameters this connection was created from.
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// The driver behind this connection.
    pub fn driver(&self) -> Driver {
        self.executor.pool().driver()
    }

    pub(crate) fn pool(&self) -> &DbPool {
        self.executor.pool()
    }

    /// Per-connection profiler (no-op unless enabled in the parameters).
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Register an execution observer.
    pub fn add_observer(&self, observer: Arc<dyn QueryObserver>) {
        self.observers.add(observer);
    }

    /// Whether query caching is currently enabled.
    pub fn use_cache(&self) -> bool {
        self.use_cache.load(Ordering::Relaxed)
    }

    /// Toggle query caching. Has no effect while the connection is in
    /// debug mode.
    pub fn set_use_cache(&self, enabled: bool) {
        self.use_cache.store(enabled, Ordering::Relaxed);
    }

    /// Rows affected by the last successful statement.
    pub fn affected_rows(&self) -> u64 {
        self.executor.affected_rows()
    }

    /// Auto-generated id of the last successful insert.
    pub fn last_insert_id(&self) -> i64 {
        self.executor.last_insert_id()
    }

    // ---------------------------------------------------------------------
    // Read path
    // ---------------------------------------------------------------------

    async fn fetch(&self, sql: &str, params: &Params, policy: &CachePolicy) -> DbalResult<RowSet> {
        Ok(self.reader.fetch(sql, params, policy).await?.rows)
    }

    /// First column of the first row, `None` if there is no row.
    pub async fn query_for_column(
        &self,
        sql: &str,
        params: &Params,
        policy: &CachePolicy,
    ) -> DbalResult<Option<JsonValue>> {
        Ok(mapper::for_column(&self.fetch(sql, params, policy).await?))
    }

    /// First column of every row.
    pub async fn query_for_column_list(
        &self,
        sql: &str,
        params: &Params,
        policy: &CachePolicy,
    ) -> DbalResult<Vec<JsonValue>> {
        Ok(mapper::for_column_list(
            &self.fetch(sql, params, policy).await?,
        ))
    }

    /// First row as a field-name -> value map; empty map if no row.
    pub async fn query_for_row(
        &self,
        sql: &str,
        params: &Params,
        policy: &CachePolicy,
    ) -> DbalResult<serde_json::Map<String, JsonValue>> {
        Ok(mapper::for_row(&self.fetch(sql, params, policy).await?))
    }

    /// All rows as field-name -> value maps.
    pub async fn query_for_list(
        &self,
        sql: &str,
        params: &Params,
        policy: &CachePolicy,
    ) -> DbalResult<Vec<serde_json::Map<String, JsonValue>>> {
        Ok(mapper::for_list(&self.fetch(sql, params, policy).await?))
    }

    /// First row hydrated into `T`, snapshot captured.
    pub async fn query_for_object<T: Entity>(
        &self,
        sql: &str,
        params: &Params,
        policy: &CachePolicy,
    ) -> DbalResult<Option<Tracked<T>>> {
        Ok(mapper::for_object(&self.fetch(sql, params, policy).await?))
    }

    /// All rows hydrated into `T`, one snapshot per entity.
    pub async fn query_for_object_list<T: Entity>(
        &self,
        sql: &str,
        params: &Params,
        policy: &CachePolicy,
    ) -> DbalResult<Vec<Tracked<T>>> {
        Ok(mapper::for_object_list(
            &self.fetch(sql, params, policy).await?,
        ))
    }

    // ---------------------------------------------------------------------
    // Write path
    // ---------------------------------------------------------------------

    /// Execute a statement and return the affected-row count.
    pub async fn query(&self, sql: &str, params: &Params) -> DbalResult<u64> {
        self.executor.execute(sql, params).await
    }

    /// Execute an INSERT and return the generated id.
    pub async fn insert(&self, sql: &str, params: &Params) -> DbalResult<i64> {
        self.executor.execute(sql, params).await?;
        Ok(self.executor.last_insert_id())
    }

    /// Execute an UPDATE and return the affected-row count.
    pub async fn update(&self, sql: &str, params: &Params) -> DbalResult<u64> {
        self.query(sql, params).await
    }

    /// Execute a DELETE and return the affected-row count.
    pub async fn delete(&self, sql: &str, params: &Params) -> DbalResult<u64> {
        self.query(sql, params).await
    }

    /// Align the session time zone with the host's current UTC offset.
    /// No-op for SQLite, which stores and compares in UTC.
    pub async fn set_session_timezone(&self) -> DbalResult<()> {
        if self.driver() != Driver::MySql {
            return Ok(());
        }
        let offset = chrono::Local::now().format("%:z").to_string();
        let sql = format!(
            "SET TIME_ZONE = '{}'",
            persist::escape_literal(Driver::MySql, &offset)
        );
        self.query(&sql, &Params::none()).await.map(|_| ())
    }

    // ---------------------------------------------------------------------
    // Object persistence
    // ---------------------------------------------------------------------

    /// Insert every declared field of `entity` into `table` and return the
    /// generated id.
    pub async fn insert_object<T: Entity>(&self, table: &str, entity: &T) -> DbalResult<i64> {
        self.insert_object_with(table, entity, InsertMode::Standard)
            .await
    }

    /// [`insert_object`](Connection::insert_object) with an explicit
    /// scheduling mode.
    pub async fn insert_object_with<T: Entity>(
        &self,
        table: &str,
        entity: &T,
        mode: InsertMode,
    ) -> DbalResult<i64> {
        let fields = T::field_names();
        if fields.is_empty() {
            return Err(DbalError::invalid_input("entity type declares no fields"));
        }
        let sql = persist::build_insert_sql(self.driver(), table, fields, mode);
        let params = Params::named(fields.iter().map(|f| (*f, entity.get(f))));
        self.insert(&sql, &params).await
    }

    /// Write the fields of `tracked` that changed since hydration, keyed on
    /// the `id` field. Issues no statement when nothing changed.
    pub async fn update_object<T: Entity>(
        &self,
        table: &str,
        tracked: &Tracked<T>,
    ) -> DbalResult<UpdateOutcome> {
        self.update_object_with(table, tracked, "id", false).await
    }

    /// [`update_object`](Connection::update_object) with an explicit
    /// primary-key field and MySQL `LOW_PRIORITY` scheduling.
    pub async fn update_object_with<T: Entity>(
        &self,
        table: &str,
        tracked: &Tracked<T>,
        primary_key: &str,
        low_priority: bool,
    ) -> DbalResult<UpdateOutcome> {
        let fields = T::field_names();
        if !fields.contains(&primary_key) {
            return Err(DbalError::invalid_input(format!(
                "entity type has no primary-key field '{}'",
                primary_key
            )));
        }

        let dirty: Vec<&'static str> = tracked
            .dirty_fields()
            .into_iter()
            .filter(|f| *f != primary_key)
            .collect();
        if dirty.is_empty() {
            return Ok(UpdateOutcome::Unchanged);
        }

        let sql = persist::build_update_sql(self.driver(), table, &dirty, primary_key, low_priority);
        let params = Params::named(
            dirty
                .iter()
                .map(|f| (*f, tracked.get(f)))
                .chain([(primary_key, tracked.get(primary_key))]),
        );
        Ok(UpdateOutcome::Applied(self.query(&sql, &params).await?))
    }

    /// Upsert `entities` into `table` with batched `REPLACE INTO`
    /// statements of up to [`DEFAULT_BATCH_SIZE`] rows each.
    pub async fn batch_insert_or_update<T: Entity>(
        &self,
        table: &str,
        entities: &[T],
    ) -> DbalResult<()> {
        self.batch_insert_or_update_with(table, entities, DEFAULT_BATCH_SIZE)
            .await
    }

    /// [`batch_insert_or_update`](Connection::batch_insert_or_update) with
    /// an explicit batch size.
    pub async fn batch_insert_or_update_with<T: Entity>(
        &self,
        table: &str,
        entities: &[T],
        batch_size: usize,
    ) -> DbalResult<()> {
        let statements =
            persist::build_replace_batches(self.driver(), table, entities, batch_size)?;
        for sql in statements {
            self.query(&sql, &Params::none()).await?;
        }
        Ok(())
    }

    /// Escape a string for inlining into a literal, without the quotes.
    pub fn escape_string(&self, raw: &str) -> String {
        persist::escape_literal(self.driver(), raw)
    }

    /// Build the body of an `IN (...)` clause from quoted-escaped values.
    pub fn merge_in_clause<S: AsRef<str>>(&self, values: &[S]) -> String {
        persist::merge_in_clause(self.driver(), values)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("params", &self.params)
            .field("use_cache", &self.use_cache())
            .finish_non_exhaustive()
    }
}
