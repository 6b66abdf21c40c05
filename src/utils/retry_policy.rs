// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

use crate::domain::crawler::CrawlerError;

/// 重试策略配置
///
/// 网络错误与超时按此策略退避重试；封锁由冷却机制处理，次数单独计算。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数（网络错误与超时）
    pub max_retries: u32,
    /// 被封锁后的最大重试次数
    pub max_block_retries: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_block_retries: 2,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            enable_jitter: true,
        }
    }
}

/// 重试判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 退避后重试
    Backoff(Duration),
    /// 等待域名冷却结束后重试
    AfterCooldown,
    /// 不再重试
    GiveUp,
}

impl RetryPolicy {
    /// 计算第 `attempt` 次重试的退避时间（从1开始）
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        // 限制最大退避时间
        let capped_backoff = backoff_secs.min(self.max_backoff.as_secs_f64());

        let final_backoff = if self.enable_jitter && capped_backoff > 0.0 {
            let jitter_range = capped_backoff * self.jitter_factor;
            if jitter_range > 0.0 {
                let jitter = rand::random_range(-jitter_range..jitter_range);
                (capped_backoff + jitter).max(0.0)
            } else {
                capped_backoff
            }
        } else {
            capped_backoff
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// 是否应该重试
    pub fn should_retry(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries
    }

    /// 是否应该在封锁后重试
    pub fn should_retry_blocked(&self, block_retries_so_far: u32) -> bool {
        block_retries_so_far < self.max_block_retries
    }

    /// 根据爬虫错误决定下一步
    ///
    /// `retries` 为已进行的网络重试次数，`block_retries` 为已进行的封锁重试次数
    pub fn decide(&self, error: &CrawlerError, retries: u32, block_retries: u32) -> RetryDecision {
        match error {
            CrawlerError::Blocked(_) if self.should_retry_blocked(block_retries) => {
                RetryDecision::AfterCooldown
            }
            e if e.is_retryable() && self.should_retry(retries) => {
                RetryDecision::Backoff(self.calculate_backoff(retries + 1))
            }
            _ => RetryDecision::GiveUp,
        }
    }

    /// 超时后的决定，与网络错误共用重试次数
    pub fn decide_timeout(&self, retries: u32) -> RetryDecision {
        if self.should_retry(retries) {
            RetryDecision::Backoff(self.calculate_backoff(retries + 1))
        } else {
            RetryDecision::GiveUp
        }
    }
}
