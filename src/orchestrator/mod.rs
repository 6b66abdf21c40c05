// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 调度器模块
///
/// 接收爬取请求，为每个数据源派发一个受限任务，汇总部分失败
pub mod scheduler;
pub mod task;
pub mod tracker;

use std::time::Duration;
use thiserror::Error;

use crate::domain::models::JobId;
use crate::utils::retry_policy::RetryPolicy;

pub use scheduler::{JobHandle, Orchestrator};
pub use tracker::{JobEntry, JobTracker};

/// 调度器错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// 请求无效（公司名为空、数据源列表为空）
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// 任务不存在
    #[error("Job not found: {0}")]
    JobNotFound(JobId),
    /// 任务尚未结束
    #[error("Job {0} is still running")]
    JobNotComplete(JobId),
    /// 没有可重新提交的数据源
    #[error("Job {0} has no failed sources to resubmit")]
    NothingToResubmit(JobId),
}

/// 调度器配置
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 全局同时进行的抓取数
    pub max_concurrent_fetches: usize,
    /// 单次抓取超时
    pub fetch_timeout: Duration,
    /// 重试策略
    pub retry: RetryPolicy,
    /// 已完成任务在内存中保留的时长
    pub job_retention: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 16,
            fetch_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            job_retention: Duration::from_secs(3600),
        }
    }
}
