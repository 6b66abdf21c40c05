// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{counter, gauge};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::task::{SourceTask, TaskContext};
use super::tracker::{JobEntry, JobTracker};
use super::{OrchestratorConfig, OrchestratorError};
use crate::anti_detection::AntiDetectionLayer;
use crate::crawlers::registry::{RegisteredSource, SourceRegistry};
use crate::domain::models::{Company, CrawlJob, FailureKind, JobId, SourceId, SourceStatus};
use crate::domain::repositories::snapshot_repository::SnapshotStore;

/// 已提交任务的句柄
#[derive(Debug, Clone)]
pub struct JobHandle {
    entry: Arc<JobEntry>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.entry.id()
    }

    /// 当前状态
    pub fn status(&self) -> CrawlJob {
        self.entry.snapshot()
    }

    /// 等待所有数据源进入终态
    pub async fn wait(&self) -> CrawlJob {
        self.entry.wait().await
    }

    pub fn cancel(&self) {
        self.entry.cancel();
    }
}

/// 爬取调度器
///
/// 每个请求的数据源一个任务，各任务独立失败，任务结束后汇总结果
pub struct Orchestrator {
    registry: Arc<SourceRegistry>,
    ctx: Arc<TaskContext>,
    tracker: JobTracker,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        anti_detection: Arc<AntiDetectionLayer>,
        store: Arc<dyn SnapshotStore>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            ctx: Arc::new(TaskContext::new(anti_detection, store, config)),
            tracker: JobTracker::new(),
        })
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.ctx.store
    }

    pub fn anti_detection(&self) -> &Arc<AntiDetectionLayer> {
        &self.ctx.anti_detection
    }

    /// 提交爬取请求，立即返回
    ///
    /// 未知数据源和已禁用数据源直接进入终态，不影响其他数据源
    pub fn submit(
        &self,
        company: Company,
        sources: Vec<String>,
        params: Map<String, Value>,
    ) -> Result<JobHandle, OrchestratorError> {
        if !company.is_valid() {
            return Err(OrchestratorError::InvalidRequest(
                "company name is empty after normalization".to_string(),
            ));
        }

        self.tracker.prune(self.ctx.config.job_retention);

        // Canonical ids where possible so `gov/x` and `government/x` collapse.
        let mut seen = HashSet::new();
        let requested: Vec<String> = sources
            .iter()
            .map(|raw| {
                raw.trim()
                    .parse::<SourceId>()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|_| raw.trim().to_string())
            })
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        if requested.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "at least one source is required".to_string(),
            ));
        }

        let job = CrawlJob::new(company.clone(), requested.clone(), params.clone());
        let entry = self.tracker.insert(job);
        info!(
            "Job {} submitted for {} with {} sources",
            entry.id(),
            company.display_name,
            requested.len()
        );
        counter!("jobs_submitted_total").increment(1);

        let mut tasks = JoinSet::new();
        for key in &requested {
            let source = match self.registry.resolve_str(key) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Job {}: {}", entry.id(), e);
                    entry.transition(
                        key,
                        SourceStatus::failed(FailureKind::UnknownSource, e.to_string()),
                    );
                    continue;
                }
            };
            if !source.is_enabled() {
                entry.transition(
                    key,
                    SourceStatus::Unavailable {
                        kind: FailureKind::SourceUnavailable,
                        message: format!("source {} is disabled", key),
                    },
                );
                continue;
            }
            tasks.spawn(self.task(&entry, source, &company, &params).run());
        }

        let supervised = entry.clone();
        tokio::spawn(async move {
            gauge!("jobs_in_flight").increment(1.0);
            while tasks.join_next().await.is_some() {}
            supervised.complete();
            gauge!("jobs_in_flight").decrement(1.0);
        });

        Ok(JobHandle { entry })
    }

    fn task(
        &self,
        entry: &Arc<JobEntry>,
        source: Arc<RegisteredSource>,
        company: &Company,
        params: &Map<String, Value>,
    ) -> SourceTask {
        SourceTask {
            ctx: self.ctx.clone(),
            job: entry.clone(),
            source,
            company: company.clone(),
            params: params.clone(),
        }
    }

    /// 提交并等待完成
    pub async fn run(
        &self,
        company: Company,
        sources: Vec<String>,
        params: Map<String, Value>,
    ) -> Result<CrawlJob, OrchestratorError> {
        let handle = self.submit(company, sources, params)?;
        Ok(handle.wait().await)
    }

    pub fn get_status(&self, id: &JobId) -> Result<CrawlJob, OrchestratorError> {
        self.entry(id).map(|e| e.snapshot())
    }

    pub fn handle(&self, id: &JobId) -> Result<JobHandle, OrchestratorError> {
        self.entry(id).map(|entry| JobHandle { entry })
    }

    pub async fn wait(&self, id: &JobId) -> Result<CrawlJob, OrchestratorError> {
        let entry = self.entry(id)?;
        Ok(entry.wait().await)
    }

    /// 取消任务，返回取消时的状态
    pub fn cancel(&self, id: &JobId) -> Result<CrawlJob, OrchestratorError> {
        let entry = self.entry(id)?;
        if !entry.is_done() {
            info!("Cancelling job {}", id);
            entry.cancel();
        }
        Ok(entry.snapshot())
    }

    /// 以新任务重新提交已结束任务中失败的数据源
    pub fn resubmit(&self, id: &JobId) -> Result<JobHandle, OrchestratorError> {
        let entry = self.entry(id)?;
        if !entry.is_done() {
            return Err(OrchestratorError::JobNotComplete(*id));
        }
        let job = entry.snapshot();
        let sources = job.resubmittable_sources();
        if sources.is_empty() {
            return Err(OrchestratorError::NothingToResubmit(*id));
        }
        info!("Resubmitting {} sources from job {}", sources.len(), id);
        self.submit(job.company, sources, job.params)
    }

    fn entry(&self, id: &JobId) -> Result<Arc<JobEntry>, OrchestratorError> {
        self.tracker
            .get(id)
            .ok_or(OrchestratorError::JobNotFound(*id))
    }
}
