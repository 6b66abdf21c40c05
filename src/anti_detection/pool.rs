// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::identity::{Identity, IdentityGenerator};
use super::AntiDetectionError;
use crate::domain::crawler::RequestProfile;

/// 身份池配置
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 每个域名同时存活的身份数上限
    pub pool_size: usize,
    /// 每个域名的并发请求上限
    pub per_domain_concurrency: usize,
    /// 单个身份最多发出的请求数
    pub max_requests_per_identity: u32,
    /// 每个域名在一个周期内可生成的身份数
    pub generation_budget: usize,
    /// 等待空闲身份的超时时间
    pub identity_wait_timeout: Duration,
    /// 生成预算耗尽后域名不可用的时长
    pub exhaustion_cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            per_domain_concurrency: 1,
            max_requests_per_identity: 50,
            generation_budget: 32,
            identity_wait_timeout: Duration::from_secs(60),
            exhaustion_cooldown: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    idle: VecDeque<Identity>,
    in_use: usize,
    /// idle + in_use
    live: usize,
    generated: usize,
    exhausted_until: Option<Instant>,
}

/// 身份池统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
    pub live: usize,
    pub generated: usize,
    pub exhausted: bool,
}

/// 单个域名的身份池
///
/// 信号量限制域名并发，互斥锁只保护空闲队列和计数，持有时间很短
#[derive(Debug)]
pub struct IdentityPool {
    domain: String,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
    generator: Arc<IdentityGenerator>,
}

impl IdentityPool {
    pub fn new(
        domain: impl Into<String>,
        config: PoolConfig,
        generator: Arc<IdentityGenerator>,
    ) -> Arc<Self> {
        let pool_size = config.pool_size.max(1);
        let permits = config.per_domain_concurrency.clamp(1, pool_size);
        Arc::new(Self {
            domain: domain.into(),
            config: PoolConfig {
                pool_size,
                ..config
            },
            permits: Arc::new(Semaphore::new(permits)),
            state: Mutex::new(PoolState::default()),
            generator,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// 获取一个当前未被占用的身份
    pub async fn acquire(self: &Arc<Self>) -> Result<IdentityLease, AntiDetectionError> {
        self.check_exhaustion(&mut self.state.lock())?;

        let permit = match tokio::time::timeout(
            self.config.identity_wait_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                warn!(
                    "Timed out waiting for an identity for {} after {:?}",
                    self.domain, self.config.identity_wait_timeout
                );
                return Err(AntiDetectionError::IdentityUnavailable {
                    domain: self.domain.clone(),
                    waited: self.config.identity_wait_timeout,
                });
            }
        };

        let mut identity = {
            let mut state = self.state.lock();
            self.check_exhaustion(&mut state)?;

            match state.idle.pop_front() {
                Some(identity) => identity,
                None if state.live < self.config.pool_size
                    && state.generated < self.config.generation_budget =>
                {
                    state.generated += 1;
                    state.live += 1;
                    let identity = self.generator.generate();
                    debug!("Generated identity {} for {}", identity.id(), self.domain);
                    identity
                }
                None => {
                    let until = Instant::now() + self.config.exhaustion_cooldown;
                    state.exhausted_until = Some(until);
                    warn!(
                        "Identity budget exhausted for {}, unavailable for {:?}",
                        self.domain, self.config.exhaustion_cooldown
                    );
                    counter!("identity_pool_exhausted_total", "domain" => self.domain.clone())
                        .increment(1);
                    return Err(AntiDetectionError::SourceUnavailable {
                        domain: self.domain.clone(),
                        retry_after: self.config.exhaustion_cooldown,
                    });
                }
            }
        };
        identity.record_request();
        {
            let mut state = self.state.lock();
            state.in_use += 1;
            gauge!("identities_in_use", "domain" => self.domain.clone()).set(state.in_use as f64);
        }

        Ok(IdentityLease {
            identity: Some(identity),
            pool: self.clone(),
            retire: false,
            _permit: permit,
        })
    }

    fn check_exhaustion(&self, state: &mut PoolState) -> Result<(), AntiDetectionError> {
        if let Some(until) = state.exhausted_until {
            let now = Instant::now();
            if now < until {
                return Err(AntiDetectionError::SourceUnavailable {
                    domain: self.domain.clone(),
                    retry_after: until - now,
                });
            }
            // Window elapsed: refill the generation budget.
            state.exhausted_until = None;
            state.generated = 0;
            debug!("Identity budget refilled for {}", self.domain);
        }
        Ok(())
    }

    fn release(&self, identity: Identity, retire: bool) {
        let mut state = self.state.lock();
        state.in_use = state.in_use.saturating_sub(1);

        let spent = identity.requests_used() >= self.config.max_requests_per_identity;
        if retire || spent {
            state.live = state.live.saturating_sub(1);
            debug!(
                "Retired identity {} for {} (blocked: {}, budget spent: {})",
                identity.id(),
                self.domain,
                retire,
                spent
            );
            counter!("identities_retired_total", "domain" => self.domain.clone()).increment(1);
        } else {
            state.idle.push_back(identity);
        }
        gauge!("identities_in_use", "domain" => self.domain.clone()).set(state.in_use as f64);
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            idle: state.idle.len(),
            in_use: state.in_use,
            live: state.live,
            generated: state.generated,
            exhausted: state.exhausted_until.is_some_and(|t| Instant::now() < t),
        }
    }
}

/// 身份租约
///
/// 在任何退出路径上（包括取消和 panic 展开）被丢弃时，身份都会归还或退役
#[derive(Debug)]
pub struct IdentityLease {
    identity: Option<Identity>,
    pool: Arc<IdentityPool>,
    retire: bool,
    _permit: OwnedSemaphorePermit,
}

impl IdentityLease {
    pub fn profile(&self) -> RequestProfile {
        self.identity
            .as_ref()
            .map(Identity::profile)
            .unwrap_or_default()
    }

    pub fn identity_id(&self) -> &str {
        self.identity.as_ref().map(Identity::id).unwrap_or_default()
    }

    pub fn domain(&self) -> &str {
        self.pool.domain()
    }

    /// 标记身份在归还时退役
    pub(crate) fn retire(&mut self) {
        self.retire = true;
    }

    pub(crate) fn merge_cookies(&mut self, cookies: &HashMap<String, String>) {
        if let Some(identity) = self.identity.as_mut() {
            identity.merge_cookies(cookies);
        }
    }
}

impl Drop for IdentityLease {
    fn drop(&mut self) {
        if let Some(identity) = self.identity.take() {
            self.pool.release(identity, self.retire);
        }
    }
}
