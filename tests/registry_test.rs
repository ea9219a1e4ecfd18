//! Integration tests for connection identity and registry lifecycle.

use dbal::{ConnectionParams, ConnectionRegistry, DbalError, Params};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_equal_params_share_one_connection() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identity.db");
    let registry = ConnectionRegistry::new();

    let first = registry
        .get_connection(&ConnectionParams::sqlite(path.to_str().unwrap()))
        .await
        .unwrap();
    let second = registry
        .get_connection(&ConnectionParams::sqlite(path.to_str().unwrap()))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.connection_count().await, 1);
}

#[tokio::test]
async fn test_distinct_params_get_distinct_connections() {
    let dir = TempDir::new().unwrap();
    let registry = ConnectionRegistry::new();

    let a = registry
        .get_connection(&ConnectionParams::sqlite(
            dir.path().join("a.db").to_str().unwrap(),
        ))
        .await
        .unwrap();
    let b = registry
        .get_connection(&ConnectionParams::sqlite(
            dir.path().join("b.db").to_str().unwrap(),
        ))
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(registry.connection_count().await, 2);
}

#[tokio::test]
async fn test_profiler_flag_changes_identity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flags.db");
    let registry = ConnectionRegistry::new();

    let plain = registry
        .get_connection(&ConnectionParams::sqlite(path.to_str().unwrap()))
        .await
        .unwrap();
    let profiled = registry
        .get_connection(&ConnectionParams::sqlite(path.to_str().unwrap()).with_profiler())
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&plain, &profiled));
    assert!(!plain.profiler().is_enabled());
    assert!(profiled.profiler().is_enabled());
}

#[tokio::test]
async fn test_concurrent_requests_converge_on_one_handle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("race.db").to_str().unwrap().to_string();
    let registry = Arc::new(ConnectionRegistry::new());

    let params = ConnectionParams::sqlite(path.as_str());
    let (a, b) = tokio::join!(
        registry.get_connection(&params),
        registry.get_connection(&params),
    );

    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(registry.connection_count().await, 1);
}

#[tokio::test]
async fn test_missing_mysql_params_fail_configuration() {
    let registry = ConnectionRegistry::new();

    let mut params = ConnectionParams::mysql("db.local", "app", "secret", "social");
    params.password = None;
    let result = registry.get_connection(&params).await;
    assert!(matches!(result, Err(DbalError::Configuration { .. })));

    let mut params = ConnectionParams::mysql("db.local", "app", "secret", "social");
    params.host = None;
    let result = registry.get_connection(&params).await;
    assert!(matches!(result, Err(DbalError::Configuration { .. })));
}

#[tokio::test]
async fn test_close_all_clears_registry() {
    let dir = TempDir::new().unwrap();
    let registry = ConnectionRegistry::new();
    let conn = registry
        .get_connection(&ConnectionParams::sqlite(
            dir.path().join("closing.db").to_str().unwrap(),
        ))
        .await
        .unwrap();

    conn.query("CREATE TABLE t (id INTEGER)", &Params::none())
        .await
        .unwrap();

    registry.close_all().await;
    assert_eq!(registry.connection_count().await, 0);

    // The pool behind the old handle is closed; statements now fail.
    let result = conn.query("SELECT 1", &Params::none()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_session_timezone_is_noop_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let registry = ConnectionRegistry::new();
    let conn = registry
        .get_connection(&ConnectionParams::sqlite(
            dir.path().join("tz.db").to_str().unwrap(),
        ))
        .await
        .unwrap();
    conn.set_session_timezone().await.unwrap();
}
