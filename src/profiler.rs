//! Per-connection statement profiling.
//!
//! When enabled, every executed statement is timed and appended to an
//! unbounded query log. The profiler is an instrument, not an error
//! channel: it observes, it never fails an execution.

use crate::value::Params;
use std::sync::Mutex;
use std::time::Duration;

/// One entry in the query log.
#[derive(Debug, Clone)]
pub struct QueryLogEntry {
    pub sql: String,
    pub elapsed: Duration,
    pub params: Params,
}

#[derive(Debug, Default)]
struct ProfilerState {
    query_count: u64,
    last_query_time: Duration,
    total_query_time: Duration,
    log: Vec<QueryLogEntry>,
}

/// Cumulative execution-time bookkeeping for one connection.
#[derive(Debug)]
pub struct Profiler {
    enabled: bool,
    state: Mutex<ProfilerState>,
}

impl Profiler {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: Mutex::new(ProfilerState::default()),
        }
    }

    /// Whether this profiler records anything.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn record(&self, sql: &str, params: &Params, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        state.query_count += 1;
        state.last_query_time = elapsed;
        state.total_query_time += elapsed;
        state.log.push(QueryLogEntry {
            sql: sql.to_string(),
            elapsed,
            params: params.clone(),
        });
    }

    /// Number of statements executed while profiling was enabled.
    pub fn query_count(&self) -> u64 {
        self.lock().query_count
    }

    /// Execution time of the most recent statement.
    pub fn last_query_time(&self) -> Duration {
        self.lock().last_query_time
    }

    /// Cumulative execution time across all statements.
    pub fn total_query_time(&self) -> Duration {
        self.lock().total_query_time
    }

    /// Snapshot of the query log.
    pub fn query_log(&self) -> Vec<QueryLogEntry> {
        self.lock().log.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProfilerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_profiler_records_nothing() {
        let profiler = Profiler::new(false);
        profiler.record("SELECT 1", &Params::none(), Duration::from_millis(5));
        assert_eq!(profiler.query_count(), 0);
        assert!(profiler.query_log().is_empty());
    }

    #[test]
    fn test_counters_accumulate() {
        let profiler = Profiler::new(true);
        profiler.record("SELECT 1", &Params::none(), Duration::from_millis(5));
        profiler.record(
            "SELECT 2",
            &Params::positional([1i64]),
            Duration::from_millis(7),
        );

        assert_eq!(profiler.query_count(), 2);
        assert_eq!(profiler.last_query_time(), Duration::from_millis(7));
        assert_eq!(profiler.total_query_time(), Duration::from_millis(12));

        let log = profiler.query_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sql, "SELECT 1");
        assert_eq!(log[1].params.len(), 1);
    }
}
