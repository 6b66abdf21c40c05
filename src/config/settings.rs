// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::anti_detection::{AntiDetectionConfig, CooldownConfig, PoolConfig};
use crate::orchestrator::OrchestratorConfig;
use crate::utils::retry_policy::RetryPolicy;

/// 应用程序配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 服务器配置
    pub server: ServerSettings,
    /// 指标导出配置
    pub metrics: MetricsSettings,
    /// 日志配置
    pub logging: LoggingSettings,
    /// 存储配置
    pub storage: StorageSettings,
    /// 调度器配置
    pub orchestrator: OrchestratorSettings,
    /// 反检测配置
    pub anti_detection: AntiDetectionSettings,
    /// 数据源配置，按 类别 → 名称 分组
    #[serde(default)]
    pub sources: BTreeMap<String, BTreeMap<String, SourceSettings>>,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 指标导出配置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// 输出 JSON 格式日志
    pub json: bool,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 存储类型 (local, s3, memory)
    pub storage_type: String,
    /// 本地存储路径 (当 type=local 时使用)
    pub local_path: Option<String>,
    /// S3 区域
    pub s3_region: Option<String>,
    /// S3 存储桶名称
    pub s3_bucket: Option<String>,
    /// S3 访问密钥
    pub s3_access_key: Option<String>,
    /// S3 密钥
    pub s3_secret_key: Option<String>,
    /// S3 端点 (可选，用于 MinIO 等兼容服务)
    pub s3_endpoint: Option<String>,
}

/// 调度器配置
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    /// 全局同时进行的抓取数
    pub max_concurrent_fetches: usize,
    /// 单次抓取超时（秒）
    pub fetch_timeout_secs: u64,
    /// 网络错误与超时的最大重试次数
    pub max_retries: u32,
    /// 封锁后的最大重试次数
    pub max_block_retries: u32,
    /// 初始退避（毫秒）
    pub initial_backoff_ms: u64,
    /// 最大退避（毫秒）
    pub max_backoff_ms: u64,
    /// 已完成任务在内存中保留的时长（秒）
    pub job_retention_secs: u64,
}

/// 反检测配置
#[derive(Debug, Clone, Deserialize)]
pub struct AntiDetectionSettings {
    pub jitter_max_ms: u64,
    pub identity_wait_timeout_secs: u64,
    pub identity_pool_size: usize,
    pub per_domain_concurrency: usize,
    pub max_requests_per_identity: u32,
    pub generation_budget: usize,
    pub exhaustion_cooldown_secs: u64,
    pub cooldown_base_secs: u64,
    pub cooldown_multiplier: f64,
    pub cooldown_max_secs: u64,
    pub success_streak_reset: u32,
    pub block_event_retention_secs: u64,
    #[serde(default)]
    pub user_agents: Vec<String>,
    #[serde(default)]
    pub proxies: Vec<String>,
}

/// 单个数据源配置
///
/// 未设置的字段沿用默认目录中的值
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceSettings {
    /// 查询端点，未设置时使用占位爬虫
    pub endpoint: Option<String>,
    /// 公司名称查询参数，默认 `q`
    pub query_param: Option<String>,
    pub api_key: Option<String>,
    /// 默认 `X-API-Key`
    pub api_key_header: Option<String>,
    /// relaxed | standard | strict | <N>ms
    pub rate_limit: Option<String>,
    pub rotate_identity: Option<bool>,
    /// 负载模式标签
    pub schema: Option<String>,
    pub enabled: Option<bool>,
    /// 覆盖从端点推导的域名
    pub domain: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次加载默认值、`config/default`、`config/{APP_ENVIRONMENT}` 和 `RIVERINFOS__*` 环境变量
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("RIVERINFOS")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("anti_detection.proxies"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 只使用内置默认值（测试用）
    pub fn from_defaults() -> Result<Self, ConfigError> {
        let settings: Settings = Self::defaults(Config::builder())?
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("metrics.enabled", true)?
            .set_default("metrics.host", "0.0.0.0")?
            .set_default("metrics.port", 9000)?
            .set_default("logging.json", false)?
            // Default Storage settings
            .set_default("storage.storage_type", "local")?
            .set_default("storage.local_path", "./storage")?
            // Default Orchestrator settings
            .set_default("orchestrator.max_concurrent_fetches", 16)?
            .set_default("orchestrator.fetch_timeout_secs", 60)?
            .set_default("orchestrator.max_retries", 2)?
            .set_default("orchestrator.max_block_retries", 2)?
            .set_default("orchestrator.initial_backoff_ms", 1000)?
            .set_default("orchestrator.max_backoff_ms", 60_000)?
            .set_default("orchestrator.job_retention_secs", 3600)?
            // Default Anti-detection settings
            .set_default("anti_detection.jitter_max_ms", 500)?
            .set_default("anti_detection.identity_wait_timeout_secs", 120)?
            .set_default("anti_detection.identity_pool_size", 4)?
            .set_default("anti_detection.per_domain_concurrency", 1)?
            .set_default("anti_detection.max_requests_per_identity", 50)?
            .set_default("anti_detection.generation_budget", 32)?
            .set_default("anti_detection.exhaustion_cooldown_secs", 600)?
            .set_default("anti_detection.cooldown_base_secs", 30)?
            .set_default("anti_detection.cooldown_multiplier", 2.0)?
            .set_default("anti_detection.cooldown_max_secs", 900)?
            .set_default("anti_detection.success_streak_reset", 3)?
            .set_default("anti_detection.block_event_retention_secs", 3600)
    }

    /// 校验配置，错误会中止启动
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ad = &self.anti_detection;
        if ad.identity_pool_size == 0 {
            return Err(ConfigError::Message(
                "anti_detection.identity_pool_size must be at least 1".to_string(),
            ));
        }
        if ad.per_domain_concurrency == 0 {
            return Err(ConfigError::Message(
                "anti_detection.per_domain_concurrency must be at least 1".to_string(),
            ));
        }
        if ad.cooldown_multiplier < 1.0 {
            return Err(ConfigError::Message(
                "anti_detection.cooldown_multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.orchestrator.max_concurrent_fetches == 0 {
            return Err(ConfigError::Message(
                "orchestrator.max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        match self.storage.storage_type.as_str() {
            "local" | "memory" => {}
            "s3" if self.storage.s3_bucket.is_some() => {}
            "s3" => {
                return Err(ConfigError::Message(
                    "storage.s3_bucket is required for s3 storage".to_string(),
                ))
            }
            other => {
                return Err(ConfigError::Message(format!(
                    "Unsupported storage type: {}",
                    other
                )))
            }
        }
        Ok(())
    }
}

impl AntiDetectionSettings {
    pub fn to_config(&self) -> AntiDetectionConfig {
        AntiDetectionConfig {
            jitter_max: Duration::from_millis(self.jitter_max_ms),
            pool: PoolConfig {
                pool_size: self.identity_pool_size,
                per_domain_concurrency: self.per_domain_concurrency,
                max_requests_per_identity: self.max_requests_per_identity,
                generation_budget: self.generation_budget,
                identity_wait_timeout: Duration::from_secs(self.identity_wait_timeout_secs),
                exhaustion_cooldown: Duration::from_secs(self.exhaustion_cooldown_secs),
            },
            cooldown: CooldownConfig {
                base: Duration::from_secs(self.cooldown_base_secs),
                multiplier: self.cooldown_multiplier,
                max: Duration::from_secs(self.cooldown_max_secs),
                success_streak_reset: self.success_streak_reset,
                event_retention: Duration::from_secs(self.block_event_retention_secs),
            },
            user_agents: self.user_agents.clone(),
            proxies: self.proxies.clone(),
        }
    }
}

impl OrchestratorSettings {
    pub fn to_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrent_fetches: self.max_concurrent_fetches,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                max_block_retries: self.max_block_retries,
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
                ..RetryPolicy::default()
            },
            job_retention: Duration::from_secs(self.job_retention_secs),
        }
    }
}
