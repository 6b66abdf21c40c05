// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::domain::models::SourceId;

/// 冷却配置
#[derive(Debug, Clone)]
pub struct CooldownConfig {
    /// 首次封锁后的冷却时长
    pub base: Duration,
    /// 连续封锁时的放大倍数
    pub multiplier: f64,
    /// 冷却时长上限
    pub max: Duration,
    /// 连续成功多少次后清零封锁计数
    pub success_streak_reset: u32,
    /// 封锁事件保留时长
    pub event_retention: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            multiplier: 2.0,
            max: Duration::from_secs(900),
            success_streak_reset: 3,
            event_retention: Duration::from_secs(3600),
        }
    }
}

impl CooldownConfig {
    /// 第 `consecutive_blocks` 次连续封锁对应的冷却时长
    pub fn window(&self, consecutive_blocks: u32) -> Duration {
        let exponent = consecutive_blocks.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }
}

/// 封锁事件
#[derive(Debug, Clone, Serialize)]
pub struct BlockEvent {
    pub domain: String,
    pub source: SourceId,
    pub identity_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    recorded_at: Instant,
}

#[derive(Debug, Default)]
struct DomainCooldown {
    consecutive_blocks: u32,
    success_streak: u32,
    cooldown_until: Option<Instant>,
}

/// 域名冷却跟踪器
///
/// 只由 `report_outcome` 写入，`pace` 读取冷却结束时间
#[derive(Debug)]
pub struct CooldownTracker {
    config: CooldownConfig,
    domains: DashMap<String, DomainCooldown>,
    events: Mutex<VecDeque<BlockEvent>>,
}

impl CooldownTracker {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            domains: DashMap::new(),
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// 当前有效的冷却结束时间
    pub fn cooldown_until(&self, domain: &str) -> Option<Instant> {
        self.domains
            .get(domain)
            .and_then(|d| d.cooldown_until)
            .filter(|until| *until > Instant::now())
    }

    pub fn consecutive_blocks(&self, domain: &str) -> u32 {
        self.domains
            .get(domain)
            .map(|d| d.consecutive_blocks)
            .unwrap_or(0)
    }

    /// 记录一次封锁，返回安排的冷却时长
    pub fn record_block(&self, domain: &str, source: &SourceId, identity_id: &str) -> Duration {
        let now = Instant::now();
        let (window, blocks) = {
            let mut state = self.domains.entry(domain.to_string()).or_default();
            state.consecutive_blocks = state.consecutive_blocks.saturating_add(1);
            state.success_streak = 0;
            let window = self.config.window(state.consecutive_blocks);
            let until = now + window;
            // Never shorten a cooldown already in force.
            state.cooldown_until = Some(state.cooldown_until.map_or(until, |u| u.max(until)));
            (window, state.consecutive_blocks)
        };

        {
            let mut events = self.events.lock();
            Self::prune(&mut events, self.config.event_retention, now);
            events.push_back(BlockEvent {
                domain: domain.to_string(),
                source: source.clone(),
                identity_id: identity_id.to_string(),
                timestamp: Utc::now(),
                recorded_at: now,
            });
        }

        warn!(
            "Blocked on {} by {} (consecutive: {}), cooling down for {:?}",
            domain, source, blocks, window
        );
        counter!("block_events_total", "domain" => domain.to_string()).increment(1);
        gauge!("domain_cooldown_seconds", "domain" => domain.to_string())
            .set(window.as_secs_f64());
        window
    }

    /// 记录一次成功
    pub fn record_success(&self, domain: &str) {
        let mut state = self.domains.entry(domain.to_string()).or_default();
        state.success_streak = state.success_streak.saturating_add(1);
        if state.consecutive_blocks > 0 && state.success_streak >= self.config.success_streak_reset
        {
            info!(
                "{} consecutive successes on {}, block counter reset",
                state.success_streak, domain
            );
            state.consecutive_blocks = 0;
            gauge!("domain_cooldown_seconds", "domain" => domain.to_string()).set(0.0);
        }
    }

    /// 记录一次临时错误：打断成功连击，不影响封锁计数
    pub fn record_transient(&self, domain: &str) {
        let mut state = self.domains.entry(domain.to_string()).or_default();
        state.success_streak = 0;
    }

    /// 保留期内的封锁事件
    pub fn recent_events(&self, domain: &str) -> Vec<BlockEvent> {
        let mut events = self.events.lock();
        Self::prune(&mut events, self.config.event_retention, Instant::now());
        events.iter().filter(|e| e.domain == domain).cloned().collect()
    }

    fn prune(events: &mut VecDeque<BlockEvent>, retention: Duration, now: Instant) {
        while let Some(front) = events.front() {
            if now.saturating_duration_since(front.recorded_at) > retention {
                events.pop_front();
            } else {
                break;
            }
        }
    }
}
