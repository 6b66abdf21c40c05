// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::models::{CrawlJob, JobId, SourceStatus};

/// 单个任务的运行时状态
#[derive(Debug)]
pub struct JobEntry {
    job: RwLock<CrawlJob>,
    cancel: CancellationToken,
    done: watch::Sender<bool>,
}

impl JobEntry {
    fn new(job: CrawlJob) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            job: RwLock::new(job),
            cancel: CancellationToken::new(),
            done,
        }
    }

    pub fn id(&self) -> JobId {
        self.job.read().id
    }

    /// 当前状态的副本
    pub fn snapshot(&self) -> CrawlJob {
        self.job.read().clone()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// 更新数据源状态，已是终态时忽略
    pub fn transition(&self, source: &str, status: SourceStatus) -> bool {
        self.job.write().transition(source, status)
    }

    /// 只记录历史，不改变当前状态
    pub fn record_attempt(&self, source: &str, status: SourceStatus) {
        self.job.write().record_attempt(source, status);
    }

    /// 取消任务：等待中的数据源会变为 Cancelled，进行中的抓取会完成并写入
    pub fn cancel(&self) {
        self.job.write().cancelled = true;
        self.cancel.cancel();
    }

    /// 所有数据源结束后调用
    pub(crate) fn complete(&self) {
        let outcome = {
            let mut job = self.job.write();
            // Anything still open at this point never got a terminal status.
            let open: Vec<String> = job
                .sources
                .iter()
                .filter(|(_, s)| !s.status.is_terminal())
                .map(|(k, _)| k.clone())
                .collect();
            for source in open {
                job.transition(&source, SourceStatus::Cancelled);
            }
            job.completed_at = Some(Utc::now());
            job.outcome()
        };
        let outcome_label = serde_json::to_value(outcome)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        info!("Job {} completed: {}", self.id(), outcome_label);
        counter!("jobs_completed_total", "outcome" => outcome_label).increment(1);
        self.done.send_replace(true);
    }

    /// 等待任务结束
    pub async fn wait(&self) -> CrawlJob {
        let mut rx = self.done.subscribe();
        // The sender lives as long as self, so the channel cannot close here.
        let _ = rx.wait_for(|done| *done).await;
        self.snapshot()
    }
}

/// 任务跟踪器
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: DashMap<JobId, Arc<JobEntry>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: CrawlJob) -> Arc<JobEntry> {
        let id = job.id;
        let entry = Arc::new(JobEntry::new(job));
        self.jobs.insert(id, entry.clone());
        entry
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<JobEntry>> {
        self.jobs.get(id).map(|e| e.clone())
    }

    /// 移除完成时间早于保留期的任务
    pub fn prune(&self, retention: Duration) {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return;
        };
        let cutoff = Utc::now() - retention;
        self.jobs.retain(|_, entry| {
            entry
                .job
                .read()
                .completed_at
                .is_none_or(|completed| completed > cutoff)
        });
    }
}
