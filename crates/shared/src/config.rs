//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// 规则引擎执行配置
///
/// 控制大数据集的分批、缓存与协作式让出节奏。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 数据量不超过该阈值时整体加载到内存，超过则走懒加载
    pub large_dataset_threshold: usize,
    /// 每批评估的行数
    pub batch_size: usize,
    /// 每处理多少批让出一次执行权
    pub yield_every_batches: usize,
    /// 扫描时每处理多少批清空一次懒加载缓存
    pub evict_every_batches: usize,
    /// 懒加载时每个分块的行数
    pub chunk_size: usize,
    /// 分块 LRU 缓存容量（分块个数）
    pub cache_capacity_chunks: usize,
    /// 是否允许普通叶子条件在 AND/OR 中短路
    pub short_circuit_leaves: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            large_dataset_threshold: 50_000,
            batch_size: 10_000,
            yield_every_batches: 1,
            evict_every_batches: 10,
            chunk_size: 5_000,
            cache_capacity_chunks: 8,
            short_circuit_leaves: true,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（COHORT_ 前缀，嵌套用双下划线，如 COHORT_ENGINE__BATCH_SIZE -> engine.batch_size）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("COHORT_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(service_name, &env, Path::new(&config_dir))
    }

    /// 从指定目录加载配置
    pub fn load_from(service_name: &str, env: &str, config_dir: &Path) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix("COHORT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.engine.validate()?;
        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl EngineConfig {
    /// 校验数值配置，零值会导致分批循环无法推进
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("engine.batch_size", self.batch_size),
            ("engine.yield_every_batches", self.yield_every_batches),
            ("engine.evict_every_batches", self.evict_every_batches),
            ("engine.chunk_size", self.chunk_size),
            ("engine.cache_capacity_chunks", self.cache_capacity_chunks),
        ];

        for (key, value) in checks {
            if value == 0 {
                return Err(ConfigError::Message(format!("{} 必须大于 0", key)));
            }
        }

        Ok(())
    }
}
