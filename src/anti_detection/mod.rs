// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 反检测层
///
/// 负责身份轮换、请求节奏、封锁检测与域名冷却
pub mod block_detector;
pub mod cooldown;
pub mod identity;
pub mod pacing;
pub mod pool;

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::crawlers::registry::RegisteredSource;
pub use block_detector::BlockDetector;
pub use cooldown::{BlockEvent, CooldownConfig, CooldownTracker};
pub use identity::{Identity, IdentityGenerator};
pub use pacing::Pacer;
pub use pool::{IdentityLease, IdentityPool, PoolConfig, PoolStats};

/// 反检测错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AntiDetectionError {
    /// 等待空闲身份超时
    #[error("No identity available for {domain} within {waited:?}")]
    IdentityUnavailable { domain: String, waited: Duration },
    /// 身份生成预算耗尽，域名暂时不可用
    #[error("Source domain {domain} unavailable, retry after {retry_after:?}")]
    SourceUnavailable {
        domain: String,
        retry_after: Duration,
    },
}

/// 反检测层配置
#[derive(Debug, Clone)]
pub struct AntiDetectionConfig {
    /// 节奏抖动上限
    pub jitter_max: Duration,
    pub pool: PoolConfig,
    pub cooldown: CooldownConfig,
    pub user_agents: Vec<String>,
    pub proxies: Vec<String>,
}

impl Default for AntiDetectionConfig {
    fn default() -> Self {
        Self {
            jitter_max: Duration::from_millis(500),
            pool: PoolConfig::default(),
            cooldown: CooldownConfig::default(),
            user_agents: Vec::new(),
            proxies: Vec::new(),
        }
    }
}

/// 一次抓取的结果类别
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 成功，附带站点返回的会话 Cookie
    Success { cookies: HashMap<String, String> },
    /// 临时错误（网络错误、超时）
    TransientError,
    /// 被封锁
    Blocked,
}

/// 反检测层
#[derive(Debug)]
pub struct AntiDetectionLayer {
    config: AntiDetectionConfig,
    pacer: Pacer,
    cooldowns: CooldownTracker,
    pools: DashMap<String, Arc<IdentityPool>>,
    generator: Arc<IdentityGenerator>,
}

impl AntiDetectionLayer {
    pub fn new(config: AntiDetectionConfig) -> Self {
        let generator = Arc::new(IdentityGenerator::new(
            config.user_agents.clone(),
            config.proxies.clone(),
        ));
        Self {
            pacer: Pacer::new(config.jitter_max),
            cooldowns: CooldownTracker::new(config.cooldown.clone()),
            pools: DashMap::new(),
            generator,
            config,
        }
    }

    fn pool(&self, domain: &str) -> Arc<IdentityPool> {
        self.pools
            .entry(domain.to_string())
            .or_insert_with(|| {
                IdentityPool::new(domain, self.config.pool.clone(), self.generator.clone())
            })
            .clone()
    }

    /// 等待到该数据源域名允许下一次请求，返回等待时长
    ///
    /// 同时等待域名上任何生效中的冷却
    pub async fn pace(&self, source: &RegisteredSource) -> Duration {
        let domain = source.domain();
        let waited = self
            .pacer
            .pace(
                domain,
                source.capabilities.rate_limit.min_interval(),
                self.cooldowns.cooldown_until(domain),
            )
            .await;
        metrics::histogram!("pacing_wait_seconds", "domain" => domain.to_string())
            .record(waited.as_secs_f64());
        waited
    }

    /// 获取一个在该域名上未被占用的身份
    pub async fn acquire_identity(
        &self,
        source: &RegisteredSource,
    ) -> Result<IdentityLease, AntiDetectionError> {
        let lease = self.pool(source.domain()).acquire().await?;
        debug!(
            "Identity {} leased for {} ({})",
            lease.identity_id(),
            source.id,
            source.domain()
        );
        Ok(lease)
    }

    /// 报告抓取结果并归还身份
    ///
    /// 返回封锁时安排的冷却时长
    pub fn report_outcome(
        &self,
        mut lease: IdentityLease,
        source: &RegisteredSource,
        outcome: FetchOutcome,
    ) -> Option<Duration> {
        let domain = source.domain();
        match outcome {
            FetchOutcome::Success { cookies } => {
                lease.merge_cookies(&cookies);
                self.cooldowns.record_success(domain);
                None
            }
            FetchOutcome::TransientError => {
                self.cooldowns.record_transient(domain);
                None
            }
            FetchOutcome::Blocked => {
                if source.capabilities.rotate_identity {
                    lease.retire();
                }
                Some(
                    self.cooldowns
                        .record_block(domain, &source.id, lease.identity_id()),
                )
            }
        }
        // lease dropped here
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    pub fn pool_stats(&self, domain: &str) -> Option<PoolStats> {
        self.pools.get(domain).map(|p| p.stats())
    }
}
