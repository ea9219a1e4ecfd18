//! Connection registry.
//!
//! The registry is the composition-root-owned pool of live connections,
//! keyed by the canonical identity of their parameters. A handle is created
//! lazily on first request and shared by every caller whose parameters
//! canonicalize to the same key; creation is serialized per key.

use crate::cache::QueryCache;
use crate::config::{ConnectionParams, Driver};
use crate::connection::Connection;
use crate::error::{DbalError, DbalResult};
use crate::hooks::OverrideHook;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{MySqlPool, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Driver-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }

    /// Get the driver for this pool.
    pub fn driver(&self) -> Driver {
        match self {
            DbPool::MySql(_) => Driver::MySql,
            DbPool::Sqlite(_) => Driver::Sqlite,
        }
    }
}

/// Keyed pool of live [`Connection`] handles.
///
/// Owned by the application's composition root and injected into callers;
/// there is no ambient global instance. Handles live until [`close_all`]
/// or process teardown.
///
/// [`close_all`]: ConnectionRegistry::close_all
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    cache: Option<Arc<dyn QueryCache>>,
    override_hook: Option<Arc<dyn OverrideHook>>,
}

impl ConnectionRegistry {
    /// Create an empty registry with no cache store and no override hook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the cache store handed to every connection this registry
    /// creates.
    pub fn with_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach the override hook handed to every connection this registry
    /// creates.
    pub fn with_override_hook(mut self, hook: Arc<dyn OverrideHook>) -> Self {
        self.override_hook = Some(hook);
        self
    }

    /// Return the connection for `params`, creating it on first request.
    ///
    /// Parameter sets with equal canonical keys observe the identical
    /// `Arc<Connection>` instance.
    pub async fn get_connection(&self, params: &ConnectionParams) -> DbalResult<Arc<Connection>> {
        let key = params.canonical_key();

        {
            let connections = self.connections.read().await;
            if let Some(existing) = connections.get(&key) {
                return Ok(Arc::clone(existing));
            }
        }

        params.validate()?;

        info!(
            driver = %params.driver,
            database = ?params.database,
            "Opening database connection"
        );
        let pool = create_pool(params).await?;

        if let DbPool::MySql(mysql) = &pool {
            if let Err(e) = prepare_mysql_session(mysql).await {
                pool.close().await;
                return Err(e);
            }
        }

        // Re-check after async work; a concurrent caller may have won the
        // race, in which case the fresh pool is discarded.
        let (connection, stale_pool) = {
            let mut connections = self.connections.write().await;
            match connections.get(&key) {
                Some(existing) => (Arc::clone(existing), Some(pool)),
                None => {
                    let connection = Arc::new(Connection::new(
                        params.clone(),
                        pool,
                        self.cache.clone(),
                        self.override_hook.clone(),
                    ));
                    connections.insert(key, Arc::clone(&connection));
                    (connection, None)
                }
            }
        };

        if let Some(stale) = stale_pool {
            stale.close().await;
        }
        Ok(connection)
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Close every connection and clear the registry.
    pub async fn close_all(&self) {
        let mut connections = self.connections.write().await;
        for (_, connection) in connections.drain() {
            connection.pool().close().await;
        }
        info!("All connections closed");
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("has_cache", &self.cache.is_some())
            .field("has_override_hook", &self.override_hook.is_some())
            .finish_non_exhaustive()
    }
}

/// Create a connection pool for the given parameters.
async fn create_pool(params: &ConnectionParams) -> DbalResult<DbPool> {
    let pool_opts = &params.pool;
    let acquire_timeout = Duration::from_secs(pool_opts.acquire_timeout_or_default());
    let idle_timeout = Some(Duration::from_secs(pool_opts.idle_timeout_or_default()));

    match params.driver {
        Driver::MySql => {
            // validate() has run; unwrapped fields are present
            let mut options = MySqlConnectOptions::new().charset("utf8mb4");
            if let Some(socket) = &params.socket {
                options = options.socket(socket);
            } else if let Some(host) = &params.host {
                options = options.host(host);
                if let Some(port) = params.port {
                    options = options.port(port);
                }
            }
            if let Some(username) = &params.username {
                options = options.username(username);
            }
            if let Some(password) = &params.password {
                options = options.password(password);
            }
            if let Some(database) = &params.database {
                options = options.database(database);
            }

            let pool = MySqlPoolOptions::new()
                .min_connections(pool_opts.min_connections_or_default())
                .max_connections(pool_opts.max_connections_or_default(false))
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(pool_opts.test_before_acquire_or_default())
                .connect_with(options)
                .await
                .map_err(|e| DbalError::connection(format!("Failed to connect: {}", e)))?;
            Ok(DbPool::MySql(pool))
        }
        Driver::Sqlite => {
            let path = params.database.as_deref().unwrap_or_default();
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            let pool = SqlitePoolOptions::new()
                .min_connections(pool_opts.min_connections_or_default())
                .max_connections(pool_opts.max_connections_or_default(true))
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(pool_opts.test_before_acquire_or_default())
                .connect_with(options)
                .await
                .map_err(|e| DbalError::connection(format!("Failed to connect: {}", e)))?;
            Ok(DbPool::Sqlite(pool))
        }
    }
}

/// Verify the server version and normalize session behavior.
///
/// Servers below major version 5 are refused. The 5.7.9+ line introduced
/// strict sql_mode defaults that break the layer's permissive statements,
/// so the session mode is cleared there.
async fn prepare_mysql_session(pool: &MySqlPool) -> DbalResult<()> {
    let version: String = sqlx::query_scalar("SELECT version()")
        .fetch_one(pool)
        .await
        .map_err(|e| DbalError::connection(format!("Failed to read server version: {}", e)))?;
    debug!(version = %version, "Got server version");

    let (major, minor, patch) = parse_server_version(&version);
    if major < 5 {
        return Err(DbalError::connection(format!(
            "Unsupported MySQL server version {}: version 5.0+ required",
            version
        )));
    }

    if major == 5 && minor >= 7 && patch >= 9 {
        use sqlx::Executor;
        // SET is not server-preparable; run it over the text protocol.
        if let Err(e) = pool.execute("SET SESSION sql_mode = ''").await {
            warn!(error = %e, "Failed to clear session sql_mode");
        }
    }
    Ok(())
}

/// Parse "8.0.32" or "5.7.30-log" into numeric components. Missing or
/// unparsable components read as zero.
fn parse_server_version(version: &str) -> (u64, u64, u64) {
    let mut parts = version.split('.').map(|part| {
        part.chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse::<u64>()
            .unwrap_or(0)
    });
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}
