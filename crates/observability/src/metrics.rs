//! 节点协议指标收集模块
//!
//! 记录通道发布、关联请求 (exchange)、重连与入站消息等运行指标。

use std::collections::HashMap;

use contracts::Operation;
use metrics::{counter, gauge, histogram};

/// Exchange 结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeOutcomeKind {
    /// 收到 `Done`
    Done,
    /// 收到非 `Done` 的最终状态
    Rejected,
    /// 超时
    TimedOut,
}

impl ExchangeOutcomeKind {
    /// 指标标签
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Rejected => "rejected",
            Self::TimedOut => "timed_out",
        }
    }
}

/// 记录一次通道发布
pub fn record_channel_publish(channel_id: u32, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "telemetry_node_publishes_total",
        "channel_id" => channel_id.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录一次 exchange 结束
pub fn record_exchange(operation: Operation, outcome: ExchangeOutcomeKind) {
    counter!(
        "telemetry_node_exchanges_total",
        "operation" => operation.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// 记录 exchange 往返耗时
pub fn record_exchange_latency_ms(operation: Operation, latency_ms: u32) {
    histogram!(
        "telemetry_node_exchange_latency_ms",
        "operation" => operation.as_str()
    )
    .record(f64::from(latency_ms));
}

/// 记录重连
pub fn record_reconnect(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("telemetry_node_reconnects_total", "status" => status).increment(1);
}

/// 记录入站消息 (routed = false 表示未知 topic 被丢弃)
pub fn record_inbound_message(routed: bool) {
    if routed {
        counter!("telemetry_node_inbound_messages_total").increment(1);
    } else {
        counter!("telemetry_node_inbound_dropped_total").increment(1);
    }
}

/// 记录当前活跃通道数
pub fn record_active_channels(count: usize) {
    gauge!("telemetry_node_active_channels").set(count as f64);
}

/// Exchange 指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct ExchangeMetricsAggregator {
    /// 各结果计数
    pub outcomes: HashMap<ExchangeOutcomeKind, u64>,

    /// 成功往返耗时统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 发布成功次数
    pub publishes: u64,

    /// 发布失败次数
    pub publish_failures: u64,

    /// 重连次数
    pub reconnects: u64,
}

impl ExchangeMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录 exchange 结果
    pub fn record_exchange(&mut self, outcome: ExchangeOutcomeKind, latency_ms: Option<u32>) {
        *self.outcomes.entry(outcome).or_insert(0) += 1;
        if let Some(ms) = latency_ms {
            self.latency_stats.push(f64::from(ms));
        }
    }

    /// 记录发布结果
    pub fn record_publish(&mut self, success: bool) {
        if success {
            self.publishes += 1;
        } else {
            self.publish_failures += 1;
        }
    }

    /// 记录一次重连
    pub fn record_reconnect(&mut self) {
        self.reconnects += 1;
    }

    /// 某类结果的次数
    pub fn count(&self, outcome: ExchangeOutcomeKind) -> u64 {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let total: u64 = self.outcomes.values().sum();
        let timed_out = self.count(ExchangeOutcomeKind::TimedOut);
        MetricsSummary {
            total_exchanges: total,
            done: self.count(ExchangeOutcomeKind::Done),
            rejected: self.count(ExchangeOutcomeKind::Rejected),
            timed_out,
            timeout_rate: if total > 0 {
                timed_out as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            latency_ms: StatsSummary::from(&self.latency_stats),
            publishes: self.publishes,
            publish_failures: self.publish_failures,
            reconnects: self.reconnects,
        }
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_exchanges: u64,
    pub done: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub timeout_rate: f64,
    pub latency_ms: StatsSummary,
    pub publishes: u64,
    pub publish_failures: u64,
    pub reconnects: u64,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Node Metrics Summary ===")?;
        writeln!(f, "Exchanges: {}", self.total_exchanges)?;
        writeln!(f, "  done: {}", self.done)?;
        writeln!(f, "  rejected: {}", self.rejected)?;
        writeln!(
            f,
            "  timed out: {} ({:.2}%)",
            self.timed_out, self.timeout_rate
        )?;
        writeln!(f, "Exchange latency (ms): {}", self.latency_ms)?;
        writeln!(
            f,
            "Publishes: {} ok, {} failed",
            self.publishes, self.publish_failures
        )?;
        writeln!(f, "Reconnects: {}", self.reconnects)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [100.0, 200.0, 300.0, 400.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 4);
        assert!((stats.mean() - 250.0).abs() < 1e-10);
        assert!((stats.min() - 100.0).abs() < 1e-10);
        assert!((stats.max() - 400.0).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_counts() {
        let mut aggregator = ExchangeMetricsAggregator::new();
        aggregator.record_exchange(ExchangeOutcomeKind::Done, Some(400));
        aggregator.record_exchange(ExchangeOutcomeKind::Done, Some(200));
        aggregator.record_exchange(ExchangeOutcomeKind::TimedOut, None);
        aggregator.record_publish(true);
        aggregator.record_publish(false);

        let summary = aggregator.summary();
        assert_eq!(summary.total_exchanges, 3);
        assert_eq!(summary.done, 2);
        assert_eq!(summary.timed_out, 1);
        assert_eq!(summary.latency_ms.count, 2);
        assert!((summary.latency_ms.mean - 300.0).abs() < 1e-10);
        assert_eq!(summary.publish_failures, 1);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = ExchangeMetricsAggregator::new();
        aggregator.record_exchange(ExchangeOutcomeKind::Done, Some(10));
        aggregator.record_exchange(ExchangeOutcomeKind::TimedOut, None);

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Exchanges: 2"));
        assert!(output.contains("50.00%"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        // 未安装 recorder 时宏调用不应 panic
        record_channel_publish(1, true);
        record_exchange(Operation::SetNodeStartupInfo, ExchangeOutcomeKind::Done);
        record_active_channels(2);
    }
}
