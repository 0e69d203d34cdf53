//! 日志订阅器初始化
//!
//! 基于 tracing-subscriber 组装环境过滤器与格式化层。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::ObservabilityConfig;

/// Tracing 资源守卫
pub struct TracingGuard {
    service_name: String,
}

impl TracingGuard {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

/// 构建环境过滤器：RUST_LOG 优先，其次配置的级别，最后回退到 info
pub fn build_env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化 tracing（日志）
pub fn init(config: &ObservabilityConfig) -> Result<TracingGuard> {
    let env_filter = build_env_filter(config);

    let fmt_layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(TracingGuard {
        service_name: config.service_name.clone(),
    })
}
