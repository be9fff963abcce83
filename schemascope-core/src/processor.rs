//! Table processing strategies
//!
//! Three pluggable strategies schedule per-table profiling behind one trait:
//! sequential, parallel (bounded worker pool + connection semaphore), and
//! adaptive (chooses between the two from the table count). Whatever the
//! strategy, the returned list is sorted by table name so identical inputs
//! produce identical ordering.

use crate::config::ProfilerConfig;
use crate::profiler::CoreProfiler;
use crate::types::{TableInfo, TableProfile};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Scheduler for per-table profiling.
#[async_trait]
pub trait TableProcessor: Send + Sync {
    /// Profile the given tables. Failed or timed-out tables are omitted;
    /// the result is sorted by table name.
    async fn process_tables(
        &self,
        tables: &[TableInfo],
        config: &ProfilerConfig,
    ) -> Vec<TableProfile>;

    fn strategy_name(&self) -> &'static str;
}

/// Build the processor for the configured strategy.
pub fn create_processor(
    profiler: Arc<CoreProfiler>,
    config: &ProfilerConfig,
    cancel: CancellationToken,
) -> Box<dyn TableProcessor> {
    match config.strategy {
        crate::config::ProfilingStrategy::Sequential => {
            Box::new(SequentialTableProcessor::new(profiler, cancel))
        }
        crate::config::ProfilingStrategy::Parallel => {
            Box::new(ParallelTableProcessor::new(profiler, cancel))
        }
        crate::config::ProfilingStrategy::Adaptive => {
            Box::new(AdaptiveTableProcessor::new(profiler, cancel))
        }
    }
}

// ============================================
// Sequential
// ============================================

/// Profiles tables one at a time, in input order.
pub struct SequentialTableProcessor {
    profiler: Arc<CoreProfiler>,
    cancel: CancellationToken,
}

impl SequentialTableProcessor {
    pub fn new(profiler: Arc<CoreProfiler>, cancel: CancellationToken) -> Self {
        Self { profiler, cancel }
    }
}

#[async_trait]
impl TableProcessor for SequentialTableProcessor {
    async fn process_tables(
        &self,
        tables: &[TableInfo],
        config: &ProfilerConfig,
    ) -> Vec<TableProfile> {
        tracing::info!(tables = tables.len(), "Processing tables sequentially");

        let mut profiles = Vec::with_capacity(tables.len());
        for (i, info) in tables.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(
                    completed = profiles.len(),
                    remaining = tables.len() - i,
                    "Run cancelled, returning partial results"
                );
                break;
            }
            tracing::debug!(
                table = %info.table_name,
                index = i + 1,
                total = tables.len(),
                "Processing table"
            );
            profiles.push(self.profiler.profile_table_info(info, config).await);
        }

        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::info!(processed = profiles.len(), "Sequential processing completed");
        profiles
    }

    fn strategy_name(&self) -> &'static str {
        "sequential"
    }
}

// ============================================
// Parallel
// ============================================

/// Profiles tables concurrently with bounded resources.
///
/// Worker concurrency is capped at `min(max_workers, tables)`; in addition,
/// every worker holds a permit from a semaphore sized `max_connections`
/// while it issues database queries, so total concurrent connections stay
/// bounded regardless of worker count. Each table gets `query_timeout`
/// seconds for its whole profiling call; on timeout it is omitted from the
/// result.
pub struct ParallelTableProcessor {
    profiler: Arc<CoreProfiler>,
    cancel: CancellationToken,
}

impl ParallelTableProcessor {
    pub fn new(profiler: Arc<CoreProfiler>, cancel: CancellationToken) -> Self {
        Self { profiler, cancel }
    }
}

#[async_trait]
impl TableProcessor for ParallelTableProcessor {
    async fn process_tables(
        &self,
        tables: &[TableInfo],
        config: &ProfilerConfig,
    ) -> Vec<TableProfile> {
        if tables.is_empty() {
            return Vec::new();
        }

        let worker_limit = config.max_workers.min(tables.len());
        tracing::info!(
            tables = tables.len(),
            workers = worker_limit,
            max_connections = config.max_connections,
            "Processing tables in parallel"
        );

        let workers = Arc::new(Semaphore::new(worker_limit));
        let connections = Arc::new(Semaphore::new(config.max_connections));
        let shared_config = Arc::new(config.clone());
        let timeout = Duration::from_secs(config.query_timeout);

        let mut set: JoinSet<Option<TableProfile>> = JoinSet::new();
        for info in tables.iter().cloned() {
            let profiler = self.profiler.clone();
            let workers = workers.clone();
            let connections = connections.clone();
            let config = shared_config.clone();
            let cancel = self.cancel.clone();

            set.spawn(async move {
                let Ok(_worker) = workers.acquire_owned().await else {
                    return None;
                };
                if cancel.is_cancelled() {
                    tracing::debug!(table = %info.table_name, "Skipping table, run cancelled");
                    return None;
                }
                let Ok(_connection) = connections.acquire_owned().await else {
                    return None;
                };

                match tokio::time::timeout(timeout, profiler.profile_table_info(&info, &config))
                    .await
                {
                    Ok(profile) => Some(profile),
                    Err(_) => {
                        tracing::error!(
                            table = %info.table_name,
                            timeout_secs = config.query_timeout,
                            "Table profiling timed out, omitting table"
                        );
                        None
                    }
                }
            });
        }

        let mut profiles = Vec::with_capacity(tables.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(profile)) => profiles.push(profile),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Profiling worker failed, omitting its table");
                }
            }
        }

        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::info!(processed = profiles.len(), "Parallel processing completed");
        profiles
    }

    fn strategy_name(&self) -> &'static str {
        "parallel"
    }
}

// ============================================
// Adaptive
// ============================================

/// Chooses parallel processing for large table sets, sequential otherwise.
pub struct AdaptiveTableProcessor {
    sequential: SequentialTableProcessor,
    parallel: ParallelTableProcessor,
}

impl AdaptiveTableProcessor {
    pub fn new(profiler: Arc<CoreProfiler>, cancel: CancellationToken) -> Self {
        Self {
            sequential: SequentialTableProcessor::new(profiler.clone(), cancel.clone()),
            parallel: ParallelTableProcessor::new(profiler, cancel),
        }
    }

    /// Whether this table count dispatches to the parallel strategy.
    pub fn uses_parallel(table_count: usize, config: &ProfilerConfig) -> bool {
        table_count >= config.parallel_threshold && config.max_workers > 1
    }
}

#[async_trait]
impl TableProcessor for AdaptiveTableProcessor {
    async fn process_tables(
        &self,
        tables: &[TableInfo],
        config: &ProfilerConfig,
    ) -> Vec<TableProfile> {
        if Self::uses_parallel(tables.len(), config) {
            tracing::info!(
                tables = tables.len(),
                threshold = config.parallel_threshold,
                "Adaptive strategy: using parallel processing"
            );
            self.parallel.process_tables(tables, config).await
        } else {
            tracing::info!(
                tables = tables.len(),
                threshold = config.parallel_threshold,
                "Adaptive strategy: using sequential processing"
            );
            self.sequential.process_tables(tables, config).await
        }
    }

    fn strategy_name(&self) -> &'static str {
        "adaptive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Connector;
    use crate::error::Result;
    use crate::types::{DatabaseType, Row};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Connector that tracks peak query concurrency and can stall or fail
    /// specific tables.
    struct GaugeConnector {
        current: AtomicUsize,
        peak: Mutex<usize>,
        delay: Duration,
        fail_needle: Option<String>,
        stall_needle: Option<String>,
    }

    impl GaugeConnector {
        fn new(delay: Duration) -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: Mutex::new(0),
                delay,
                fail_needle: None,
                stall_needle: None,
            }
        }

        fn failing_on(mut self, needle: &str) -> Self {
            self.fail_needle = Some(needle.to_string());
            self
        }

        fn stalling_on(mut self, needle: &str) -> Self {
            self.stall_needle = Some(needle.to_string());
            self
        }

        fn peak(&self) -> usize {
            *self.peak.lock().unwrap()
        }
    }

    #[async_trait]
    impl Connector for GaugeConnector {
        fn database_type(&self) -> DatabaseType {
            DatabaseType::Mysql
        }

        async fn execute_query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
            let active = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            {
                let mut peak = self.peak.lock().unwrap();
                *peak = (*peak).max(active);
            }

            if let Some(needle) = &self.stall_needle {
                if sql.contains(needle.as_str()) {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
            }
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if let Some(needle) = &self.fail_needle {
                if sql.contains(needle.as_str()) {
                    return Err(crate::error::Error::Connector("scripted failure".into()));
                }
            }
            Ok(Vec::new())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn table_infos(names: &[&str]) -> Vec<TableInfo> {
        names
            .iter()
            .map(|n| TableInfo {
                table_name: n.to_string(),
                table_type: "BASE TABLE".to_string(),
                table_comment: None,
                estimated_rows: None,
            })
            .collect()
    }

    fn config() -> ProfilerConfig {
        ProfilerConfig::new("clinic").unwrap()
    }

    fn profiler_over(connector: Arc<dyn Connector>) -> Arc<CoreProfiler> {
        Arc::new(CoreProfiler::new(connector, &config()))
    }

    #[tokio::test]
    async fn test_sequential_sorts_output() {
        let profiler = profiler_over(Arc::new(GaugeConnector::new(Duration::ZERO)));
        let processor = SequentialTableProcessor::new(profiler, CancellationToken::new());

        let profiles = processor
            .process_tables(&table_infos(&["zebra", "alpha", "monkey"]), &config())
            .await;
        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "monkey", "zebra"]);
    }

    #[tokio::test]
    async fn test_parallel_respects_connection_budget() {
        let connector = Arc::new(GaugeConnector::new(Duration::from_millis(10)));
        let profiler = profiler_over(connector.clone());
        let processor = ParallelTableProcessor::new(profiler, CancellationToken::new());

        let mut cfg = config();
        cfg.max_workers = 8;
        cfg.max_connections = 2;

        let names: Vec<String> = (0..12).map(|i| format!("table_{:02}", i)).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let profiles = processor
            .process_tables(&table_infos(&name_refs), &cfg)
            .await;

        assert_eq!(profiles.len(), 12);
        // A worker profiles one table at a time on one acquired connection,
        // so peak concurrency is bounded by the connection budget
        assert!(
            connector.peak() <= 2,
            "peak concurrency {} exceeded connection budget",
            connector.peak()
        );
    }

    #[tokio::test]
    async fn test_parallel_single_worker_behaves_sequentially() {
        let connector = Arc::new(GaugeConnector::new(Duration::from_millis(5)));
        let profiler = profiler_over(connector.clone());
        let processor = ParallelTableProcessor::new(profiler, CancellationToken::new());

        let mut cfg = config();
        cfg.max_workers = 1;

        let profiles = processor
            .process_tables(&table_infos(&["b", "a", "c"]), &cfg)
            .await;
        assert_eq!(profiles.len(), 3);
        assert!(connector.peak() <= 1);
        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_parallel_timeout_omits_table() {
        // Stall every query against the "slow" table's sample select
        let connector =
            Arc::new(GaugeConnector::new(Duration::ZERO).stalling_on("`slow`"));
        let profiler = profiler_over(connector);
        let processor = ParallelTableProcessor::new(profiler, CancellationToken::new());

        let mut cfg = config();
        cfg.query_timeout = 1;

        let profiles = processor
            .process_tables(&table_infos(&["fast", "slow"]), &cfg)
            .await;
        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["fast"]);
    }

    #[tokio::test]
    async fn test_parallel_failure_isolation() {
        // Queries for one table fail; the table still comes back with empty
        // metadata and the others are untouched
        let connector = Arc::new(GaugeConnector::new(Duration::ZERO).failing_on("`broken`"));
        let profiler = profiler_over(connector);
        let processor = ParallelTableProcessor::new(profiler, CancellationToken::new());

        let profiles = processor
            .process_tables(&table_infos(&["alpha", "broken", "zulu"]), &config())
            .await;
        assert_eq!(profiles.len(), 3);
        let broken = profiles.iter().find(|p| p.name == "broken").unwrap();
        assert!(broken.columns.is_empty());
        assert_eq!(broken.estimated_row_count, 0);
    }

    #[tokio::test]
    async fn test_adaptive_dispatch() {
        let mut cfg = config();
        cfg.parallel_threshold = 10;
        cfg.max_workers = 4;

        assert!(!AdaptiveTableProcessor::uses_parallel(8, &cfg));
        assert!(AdaptiveTableProcessor::uses_parallel(12, &cfg));

        cfg.max_workers = 1;
        assert!(!AdaptiveTableProcessor::uses_parallel(12, &cfg));
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial_results() {
        let profiler = profiler_over(Arc::new(GaugeConnector::new(Duration::ZERO)));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let processor = SequentialTableProcessor::new(profiler, cancel);

        let profiles = processor
            .process_tables(&table_infos(&["a", "b"]), &config())
            .await;
        assert!(profiles.is_empty());
    }

    #[tokio::test]
    async fn test_strategy_names() {
        let profiler = profiler_over(Arc::new(GaugeConnector::new(Duration::ZERO)));
        let cancel = CancellationToken::new();
        assert_eq!(
            SequentialTableProcessor::new(profiler.clone(), cancel.clone()).strategy_name(),
            "sequential"
        );
        assert_eq!(
            ParallelTableProcessor::new(profiler.clone(), cancel.clone()).strategy_name(),
            "parallel"
        );
        assert_eq!(
            AdaptiveTableProcessor::new(profiler, cancel).strategy_name(),
            "adaptive"
        );
    }
}
