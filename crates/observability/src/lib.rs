//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出 (可选)
//! - 节点协议指标收集与统计
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init_with_config, ObservabilityConfig, LogFormat};
//!
//! init_with_config(ObservabilityConfig {
//!     log_format: LogFormat::Compact,
//!     ..Default::default()
//! })?;
//!
//! observability::record_channel_publish(1, true);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

// Re-exports
pub use crate::metrics::{
    record_active_channels, record_channel_publish, record_exchange, record_exchange_latency_ms,
    record_inbound_message, record_reconnect, ExchangeMetricsAggregator, ExchangeOutcomeKind,
    MetricsSummary, RunningStats, StatsSummary,
};

/// 初始化可观测性（仅 Tracing，JSON 格式）
///
/// 节点通常运行在没有 HTTP 监听能力的环境，默认不启用 Prometheus。
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
    /// 默认日志级别
    pub default_log_level: String,
    /// 按 target 覆盖的级别，如 `telemetry_node::exchange=debug`
    pub directives: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
            directives: Vec::new(),
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}

impl LogFormat {
    /// 从字符串解析 (大小写不敏感)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// 构建过滤器：`RUST_LOG` 优先，否则默认级别加上各 target 覆盖
pub fn build_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let mut filter = EnvFilter::try_new(&config.default_log_level)
        .with_context(|| format!("Invalid log level '{}'", config.default_log_level))?;
    for directive in &config.directives {
        let parsed: Directive = directive
            .parse()
            .with_context(|| format!("Invalid log directive '{directive}'"))?;
        filter = filter.add_directive(parsed);
    }
    Ok(filter)
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}

/// 使用自定义配置初始化
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    tracing_subscriber::registry()
        .with(fmt_layer(config.log_format))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        directives = ?config.directives,
        "Observability initialized"
    );

    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 用于 Tracing 已由其他模块初始化的场景。
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
