//! Cache-aware SQL data-access layer.
//!
//! A connection-pooled execution façade over MySQL and SQLite that maps
//! result rows onto typed entities, tracks per-entity dirty fields for
//! partial updates, batches upserts, and wraps reads in a pluggable
//! look-aside cache with tag metadata and an override hook.
//!
//! ```no_run
//! use dbal::{CachePolicy, ConnectionParams, ConnectionRegistry, Params, entity_fields};
//!
//! #[derive(Debug, Default, Clone)]
//! struct Account {
//!     id: i64,
//!     email: String,
//!     active: bool,
//! }
//!
//! entity_fields!(Account { id, email, active });
//!
//! # async fn demo() -> dbal::DbalResult<()> {
//! let registry = ConnectionRegistry::new();
//! let conn = registry
//!     .get_connection(&ConnectionParams::sqlite("data.db"))
//!     .await?;
//!
//! let account = Account {
//!     email: "ada@example.org".to_string(),
//!     active: true,
//!     ..Account::default()
//! };
//! let id = conn.insert_object("account", &account).await?;
//!
//! let mut found = conn
//!     .query_for_object::<Account>(
//!         "SELECT * FROM account WHERE id = :id",
//!         &Params::named([("id", id)]),
//!         &CachePolicy::disabled(),
//!     )
//!     .await?
//!     .expect("row just inserted");
//!
//! found.active = false;
//! conn.update_object("account", &found).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
mod executor;
pub mod hooks;
pub mod mapper;
pub mod persist;
pub mod profiler;
pub mod registry;
pub mod row;
pub mod value;

pub use cache::{CacheLifetime, CachePolicy, MemoryCache, QueryCache, cache_key};
pub use config::{ConnectionParams, Driver, PoolOptions};
pub use connection::{Connection, UpdateOutcome};
pub use entity::{Entity, FieldSnapshot, FieldType, Tracked};
pub use error::{DbalError, DbalResult};
pub use hooks::{OverrideHook, QueryObserver};
pub use persist::{DEFAULT_BATCH_SIZE, InsertMode};
pub use profiler::{Profiler, QueryLogEntry};
pub use registry::{ConnectionRegistry, DbPool};
pub use row::RowSet;
pub use value::{Params, SqlValue};
