//! 性能指标收集模块
//!
//! 编译与执行的运行时计数，可导出快照或 Prometheus 文本

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 慢执行阈值
const SLOW_EXECUTION: Duration = Duration::from_secs(1);

/// 全局指标
#[derive(Debug)]
pub struct Metrics {
    compile_stats: CompileStats,
    execution_stats: ExecutionStats,
    leaf_stats: LeafStats,
    start_time: Instant,
}

/// 编译统计
#[derive(Debug, Default)]
struct CompileStats {
    /// 编译次数
    compilations: AtomicU64,
    /// 累计解析的查询节点数
    nodes: AtomicU64,
}

/// 执行统计
#[derive(Debug, Default)]
struct ExecutionStats {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    /// 总耗时（微秒）
    total_duration_us: AtomicU64,
    /// 慢执行数（>1s）
    slow: AtomicU64,
}

/// 叶子遍历统计
#[derive(Debug, Default)]
struct LeafStats {
    traversals: AtomicU64,
    cache_hits: AtomicU64,
}

/// 可导出的指标快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    // 编译
    pub compilations: u64,
    pub compiled_nodes: u64,

    // 执行
    pub total_executions: u64,
    pub success_executions: u64,
    pub failed_executions: u64,
    pub cancelled_executions: u64,
    pub avg_execution_ms: f64,
    pub slow_executions: u64,

    // 叶子
    pub leaf_traversals: u64,
    pub leaf_cache_hits: u64,
    pub leaf_cache_hit_rate: f64,

    pub uptime_seconds: u64,
}

/// Prometheus 格式指标
#[derive(Debug, Clone)]
pub struct PrometheusMetrics {
    pub content: String,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            compile_stats: CompileStats::default(),
            execution_stats: ExecutionStats::default(),
            leaf_stats: LeafStats::default(),
            start_time: Instant::now(),
        }
    }

    /// 记录一次编译及其解析的节点数
    pub fn record_compile(&self, nodes: usize) {
        self.compile_stats.compilations.fetch_add(1, Ordering::Relaxed);
        self.compile_stats
            .nodes
            .fetch_add(nodes as u64, Ordering::Relaxed);
    }

    /// 记录执行开始
    pub fn record_execution_start(&self) -> QueryTimer {
        self.execution_stats.total.fetch_add(1, Ordering::Relaxed);
        QueryTimer::new()
    }

    /// 记录执行结束，取消单独计数
    pub fn record_execution_complete<T>(&self, timer: QueryTimer, outcome: &Result<T, Error>) {
        let duration = timer.elapsed();
        let stats = &self.execution_stats;

        match outcome {
            Ok(_) => stats.success.fetch_add(1, Ordering::Relaxed),
            Err(Error::Cancelled) => stats.cancelled.fetch_add(1, Ordering::Relaxed),
            Err(_) => stats.failed.fetch_add(1, Ordering::Relaxed),
        };

        stats
            .total_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if duration >= SLOW_EXECUTION {
            stats.slow.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_leaf_traversal(&self) {
        self.leaf_stats.traversals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_leaf_cache_hit(&self) {
        self.leaf_stats.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let exec = &self.execution_stats;
        let total = exec.total.load(Ordering::Relaxed);
        let total_duration_us = exec.total_duration_us.load(Ordering::Relaxed);
        let traversals = self.leaf_stats.traversals.load(Ordering::Relaxed);
        let hits = self.leaf_stats.cache_hits.load(Ordering::Relaxed);

        let avg_execution_ms = if total > 0 {
            (total_duration_us as f64) / (total as f64) / 1000.0
        } else {
            0.0
        };
        let leaf_cache_hit_rate = if traversals + hits > 0 {
            (hits as f64) / ((traversals + hits) as f64)
        } else {
            0.0
        };

        MetricsSnapshot {
            compilations: self.compile_stats.compilations.load(Ordering::Relaxed),
            compiled_nodes: self.compile_stats.nodes.load(Ordering::Relaxed),
            total_executions: total,
            success_executions: exec.success.load(Ordering::Relaxed),
            failed_executions: exec.failed.load(Ordering::Relaxed),
            cancelled_executions: exec.cancelled.load(Ordering::Relaxed),
            avg_execution_ms,
            slow_executions: exec.slow.load(Ordering::Relaxed),
            leaf_traversals: traversals,
            leaf_cache_hits: hits,
            leaf_cache_hit_rate,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// 导出为 Prometheus 格式
    pub fn to_prometheus(&self) -> PrometheusMetrics {
        let s = self.snapshot();
        let entries: [(&str, &str, &str, String); 10] = [
            ("compilations_total", "counter", "Number of query compilations", s.compilations.to_string()),
            ("compiled_nodes_total", "counter", "Query nodes resolved during compilation", s.compiled_nodes.to_string()),
            ("executions_total", "counter", "Number of executions", s.total_executions.to_string()),
            ("executions_failed_total", "counter", "Number of failed executions", s.failed_executions.to_string()),
            ("executions_cancelled_total", "counter", "Number of cancelled executions", s.cancelled_executions.to_string()),
            ("execution_duration_avg_ms", "gauge", "Average execution duration in milliseconds", format!("{:.2}", s.avg_execution_ms)),
            ("slow_executions_total", "counter", "Number of slow executions (>1s)", s.slow_executions.to_string()),
            ("leaf_traversals_total", "counter", "Leaf traversals sent to the storage layer", s.leaf_traversals.to_string()),
            ("leaf_cache_hits_total", "counter", "Leaf results served from the per-execution cache", s.leaf_cache_hits.to_string()),
            ("uptime_seconds", "counter", "Process uptime in seconds", s.uptime_seconds.to_string()),
        ];

        let mut content = String::new();
        for (name, kind, help, value) in entries {
            content.push_str(&format!("# HELP pathquery_{} {}\n", name, help));
            content.push_str(&format!("# TYPE pathquery_{} {}\n", name, kind));
            content.push_str(&format!("pathquery_{} {}\n", name, value));
        }
        PrometheusMetrics { content }
    }

    /// 重置所有指标
    pub fn reset(&self) {
        let counters = [
            &self.compile_stats.compilations,
            &self.compile_stats.nodes,
            &self.execution_stats.total,
            &self.execution_stats.success,
            &self.execution_stats.failed,
            &self.execution_stats.cancelled,
            &self.execution_stats.total_duration_us,
            &self.execution_stats.slow,
            &self.leaf_stats.traversals,
            &self.leaf_stats.cache_hits,
        ];
        for counter in counters {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 执行计时器
pub struct QueryTimer {
    start: Instant,
}

impl QueryTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

static METRICS: once_cell::sync::Lazy<Arc<Metrics>> =
    once_cell::sync::Lazy::new(|| Arc::new(Metrics::new()));

/// 获取全局指标实例
pub fn global_metrics() -> Arc<Metrics> {
    METRICS.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot() {
        let metrics = Metrics::new();

        let timer = metrics.record_execution_start();
        std::thread::sleep(Duration::from_millis(10));
        metrics.record_execution_complete(timer, &Ok::<_, Error>(()));

        let timer = metrics.record_execution_start();
        metrics.record_execution_complete(timer, &Err::<(), _>(Error::Cancelled));
        let timer = metrics.record_execution_start();
        metrics.record_execution_complete(timer, &Err::<(), _>(Error::NotFound("q".into())));

        metrics.record_compile(3);
        metrics.record_leaf_traversal();
        metrics.record_leaf_cache_hit();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_executions, 3);
        assert_eq!(snapshot.success_executions, 1);
        assert_eq!(snapshot.cancelled_executions, 1);
        assert_eq!(snapshot.failed_executions, 1);
        assert_eq!(snapshot.compiled_nodes, 3);
        assert!((snapshot.leaf_cache_hit_rate - 0.5).abs() < f64::EPSILON);
        assert!(snapshot.avg_execution_ms >= 10.0 / 3.0);

        metrics.reset();
        assert_eq!(metrics.snapshot().total_executions, 0);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.record_execution_start();
        metrics.record_leaf_cache_hit();

        let prom = metrics.to_prometheus();
        assert!(prom.content.contains("pathquery_executions_total 1"));
        assert!(prom.content.contains("pathquery_leaf_cache_hits_total 1"));
    }
}
