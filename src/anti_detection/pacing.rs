// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// 按域名控制请求节奏
///
/// 在短暂的分片锁内预约下一个时间槽，然后在锁外睡眠，
/// 同一域名的并发调用者因此被依次错开
#[derive(Debug)]
pub struct Pacer {
    next_slot: DashMap<String, Instant>,
    jitter_max: Duration,
}

impl Pacer {
    pub fn new(jitter_max: Duration) -> Self {
        Self {
            next_slot: DashMap::new(),
            jitter_max,
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.jitter_max.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::random_range(0..=max_ms))
        }
    }

    /// 预约时间槽，返回需要等到的时刻
    ///
    /// `not_before` 为域名冷却结束时间
    pub fn reserve(
        &self,
        domain: &str,
        min_interval: Duration,
        not_before: Option<Instant>,
    ) -> Instant {
        let now = Instant::now();
        let mut entry = self.next_slot.entry(domain.to_string()).or_insert(now);
        let mut slot = (*entry).max(now);
        if let Some(not_before) = not_before {
            slot = slot.max(not_before);
        }
        *entry = slot + min_interval + self.jitter();
        slot
    }

    /// 等待轮到本次请求，返回实际等待时长
    pub async fn pace(
        &self,
        domain: &str,
        min_interval: Duration,
        not_before: Option<Instant>,
    ) -> Duration {
        let start = Instant::now();
        let slot = self.reserve(domain, min_interval, not_before);
        if slot > start {
            debug!("Pacing {} for {:?}", domain, slot - start);
            tokio::time::sleep_until(slot).await;
        }
        slot.saturating_duration_since(start)
    }
}
