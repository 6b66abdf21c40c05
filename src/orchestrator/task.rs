// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::{Map, Value};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::tracker::JobEntry;
use super::OrchestratorConfig;
use crate::anti_detection::{AntiDetectionError, AntiDetectionLayer, FetchOutcome};
use crate::crawlers::registry::RegisteredSource;
use crate::domain::crawler::{CrawlerError, FetchOptions};
use crate::domain::models::{Company, CompanyKey, FailureKind, SourceId, SourceStatus};
use crate::domain::repositories::snapshot_repository::SnapshotStore;
use crate::domain::services::normalize;
use crate::utils::retry_policy::RetryDecision;

/// 数据源任务共享的运行环境
pub struct TaskContext {
    pub anti_detection: Arc<AntiDetectionLayer>,
    pub store: Arc<dyn SnapshotStore>,
    pub config: OrchestratorConfig,
    /// 全局抓取并发
    global_permits: Arc<Semaphore>,
    /// 同一 (公司, 数据源) 同时只允许一个任务
    pair_gates: DashMap<(CompanyKey, SourceId), Arc<Semaphore>>,
}

impl TaskContext {
    pub fn new(
        anti_detection: Arc<AntiDetectionLayer>,
        store: Arc<dyn SnapshotStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            global_permits: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            pair_gates: DashMap::new(),
            anti_detection,
            store,
            config,
        }
    }

    fn pair_gate(&self, key: &(CompanyKey, SourceId)) -> Arc<Semaphore> {
        self.pair_gates
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    fn release_pair_gate(&self, key: &(CompanyKey, SourceId)) {
        self.pair_gates
            .remove_if(key, |_, gate| Arc::strong_count(gate) == 1);
    }
}

/// 在取消信号和给定 future 之间竞争，取消优先
async fn or_cancel<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "crawler panicked".to_string()
    }
}

fn final_status(err: &CrawlerError) -> SourceStatus {
    match err {
        CrawlerError::Network(m) => SourceStatus::failed(FailureKind::NetworkError, m.clone()),
        CrawlerError::Parse(m) => SourceStatus::failed(FailureKind::ParseError, m.clone()),
        CrawlerError::AuthRequired(m) => {
            SourceStatus::failed(FailureKind::AuthRequired, m.clone())
        }
        CrawlerError::Blocked(m) => SourceStatus::Blocked { message: m.clone() },
    }
}

fn unavailable_status(err: &AntiDetectionError) -> SourceStatus {
    let kind = match err {
        AntiDetectionError::IdentityUnavailable { .. } => FailureKind::IdentityUnavailable,
        AntiDetectionError::SourceUnavailable { .. } => FailureKind::SourceUnavailable,
    };
    SourceStatus::Unavailable {
        kind,
        message: err.to_string(),
    }
}

/// 单个数据源的抓取任务
pub struct SourceTask {
    pub ctx: Arc<TaskContext>,
    pub job: Arc<JobEntry>,
    pub source: Arc<RegisteredSource>,
    pub company: Company,
    pub params: Map<String, Value>,
}

impl SourceTask {
    fn source_key(&self) -> String {
        self.source.id.to_string()
    }

    fn finish(&self, status: SourceStatus) {
        let label = status.label();
        if self.job.transition(&self.source_key(), status) {
            counter!(
                "source_fetches_total",
                "source" => self.source_key(),
                "status" => label
            )
            .increment(1);
        }
    }

    /// 运行任务直到数据源进入终态，崩溃会被转换为 CrawlerPanic
    pub async fn run(self) {
        let job = self.job.clone();
        let key = self.source_key();
        if let Err(panic) = AssertUnwindSafe(self.run_inner()).catch_unwind().await {
            let message = panic_message(panic.as_ref());
            error!("Task for {} panicked: {}", key, message);
            job.transition(&key, SourceStatus::failed(FailureKind::CrawlerPanic, message));
        }
    }

    async fn run_inner(self) {
        let gate_key = (self.company.key.clone(), self.source.id.clone());
        let gate = self.ctx.pair_gate(&gate_key);
        let cancel = self.job.cancel_token().clone();

        match or_cancel(&cancel, gate.clone().acquire_owned()).await {
            Some(Ok(permit)) => {
                self.attempt_loop(&cancel).await;
                drop(permit);
            }
            Some(Err(_)) | None => self.finish(SourceStatus::Cancelled),
        }

        drop(gate);
        self.ctx.release_pair_gate(&gate_key);
    }

    async fn attempt_loop(&self, cancel: &CancellationToken) {
        let key = self.source_key();
        let policy = &self.ctx.config.retry;
        let anti = &self.ctx.anti_detection;
        let mut attempt: u32 = 0;
        let mut retries: u32 = 0;
        let mut block_retries: u32 = 0;

        loop {
            attempt += 1;

            // Pacing also waits out any cooldown the previous attempt caused.
            if or_cancel(cancel, anti.pace(&self.source)).await.is_none() {
                self.finish(SourceStatus::Cancelled);
                return;
            }

            let lease = match or_cancel(cancel, anti.acquire_identity(&self.source)).await {
                None => {
                    self.finish(SourceStatus::Cancelled);
                    return;
                }
                Some(Err(e)) => {
                    warn!("{} for {}: {}", key, self.company.display_name, e);
                    self.finish(unavailable_status(&e));
                    return;
                }
                Some(Ok(lease)) => lease,
            };

            let permit =
                match or_cancel(cancel, self.ctx.global_permits.clone().acquire_owned()).await {
                    Some(Ok(permit)) => permit,
                    _ => {
                        self.finish(SourceStatus::Cancelled);
                        return;
                    }
                };

            self.job.transition(&key, SourceStatus::Running { attempt });
            debug!(
                "Fetching {} for {} (attempt {}, identity {})",
                key,
                self.company.display_name,
                attempt,
                lease.identity_id()
            );

            let options = FetchOptions {
                profile: lease.profile(),
                params: self.params.clone(),
            };
            let started = Instant::now();
            // In-flight fetches are not interrupted by cancellation.
            let result = tokio::time::timeout(
                self.ctx.config.fetch_timeout,
                AssertUnwindSafe(self.source.crawler.fetch(&self.company, &options)).catch_unwind(),
            )
            .await;
            let elapsed = started.elapsed();
            drop(permit);
            histogram!("fetch_duration_seconds", "source" => key.clone())
                .record(elapsed.as_secs_f64());

            let retry_after = match result {
                Ok(Ok(Ok(output))) => {
                    anti.report_outcome(
                        lease,
                        &self.source,
                        FetchOutcome::Success {
                            cookies: output.cookies,
                        },
                    );
                    self.persist(output.payload, attempt, elapsed.as_millis() as u64)
                        .await;
                    return;
                }
                Ok(Err(panic)) => {
                    drop(lease);
                    let message = panic_message(panic.as_ref());
                    error!("Crawler {} panicked: {}", key, message);
                    self.finish(SourceStatus::failed(FailureKind::CrawlerPanic, message));
                    return;
                }
                Err(_) => {
                    anti.report_outcome(lease, &self.source, FetchOutcome::TransientError);
                    warn!("{} timed out after {:?}", key, self.ctx.config.fetch_timeout);
                    match policy.decide_timeout(retries) {
                        RetryDecision::Backoff(delay) => {
                            retries += 1;
                            self.job.record_attempt(&key, SourceStatus::TimedOut);
                            Some(delay)
                        }
                        _ => {
                            self.finish(SourceStatus::TimedOut);
                            return;
                        }
                    }
                }
                Ok(Ok(Err(err))) => {
                    let outcome = if err.is_blocked() {
                        FetchOutcome::Blocked
                    } else {
                        FetchOutcome::TransientError
                    };
                    if let Some(cooldown) = anti.report_outcome(lease, &self.source, outcome) {
                        warn!("{} blocked, domain cooling down for {:?}", key, cooldown);
                    }
                    match policy.decide(&err, retries, block_retries) {
                        RetryDecision::AfterCooldown => {
                            block_retries += 1;
                            self.job.record_attempt(&key, final_status(&err));
                            None
                        }
                        RetryDecision::Backoff(delay) => {
                            retries += 1;
                            self.job.record_attempt(&key, final_status(&err));
                            Some(delay)
                        }
                        RetryDecision::GiveUp => {
                            info!("{} gave up after {} attempts: {}", key, attempt, err);
                            self.finish(final_status(&err));
                            return;
                        }
                    }
                }
            };

            if let Some(delay) = retry_after {
                if or_cancel(cancel, tokio::time::sleep(delay)).await.is_none() {
                    self.finish(SourceStatus::Cancelled);
                    return;
                }
            }
        }
    }

    async fn persist(&self, payload: Value, attempts: u32, fetch_duration_ms: u64) {
        let key = self.source_key();
        let normalized = normalize(self.source.capabilities.schema, payload);
        let schema_mismatch = normalized.schema_mismatch();
        if schema_mismatch {
            warn!(
                "{} payload for {} has {} schema warnings",
                key,
                self.company.display_name,
                normalized.warnings.len()
            );
        }
        let snapshot = normalized.into_snapshot(
            self.company.clone(),
            self.source.id.clone(),
            self.source.capabilities.schema,
            self.source.crawler.name(),
            attempts,
            fetch_duration_ms,
        );

        match self.ctx.store.append(snapshot).await {
            Ok(snapshot_id) => self.finish(SourceStatus::Succeeded {
                snapshot_id,
                schema_mismatch,
            }),
            Err(e) => {
                error!("Failed to store snapshot for {}: {}", key, e);
                self.finish(SourceStatus::failed(FailureKind::StorageError, e.to_string()));
            }
        }
    }
}
