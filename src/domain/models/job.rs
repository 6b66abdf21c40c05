// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::company::Company;
use super::snapshot::SnapshotId;

/// 任务ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 单个数据源失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 注册表中不存在
    UnknownSource,
    /// 身份池等待超时
    IdentityUnavailable,
    /// 数据源暂时不可用（身份生成耗尽或被禁用）
    SourceUnavailable,
    /// 网络错误
    NetworkError,
    /// 解析错误
    ParseError,
    /// 需要认证
    AuthRequired,
    /// 快照写入失败
    StorageError,
    /// 爬虫内部崩溃
    CrawlerPanic,
}

impl FailureKind {
    /// 是否值得重新提交
    pub fn is_resubmittable(&self) -> bool {
        !matches!(self, FailureKind::UnknownSource)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::UnknownSource => "unknown_source",
            FailureKind::IdentityUnavailable => "identity_unavailable",
            FailureKind::SourceUnavailable => "source_unavailable",
            FailureKind::NetworkError => "network_error",
            FailureKind::ParseError => "parse_error",
            FailureKind::AuthRequired => "auth_required",
            FailureKind::StorageError => "storage_error",
            FailureKind::CrawlerPanic => "crawler_panic",
        };
        f.write_str(s)
    }
}

/// 单个数据源状态
///
/// Pending → Running → (Succeeded | Failed | Blocked | TimedOut | Unavailable | Cancelled)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Running {
        attempt: u32,
    },
    Succeeded {
        snapshot_id: SnapshotId,
        schema_mismatch: bool,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
    Blocked {
        message: String,
    },
    TimedOut,
    Unavailable {
        kind: FailureKind,
        message: String,
    },
    Cancelled,
}

impl SourceStatus {
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        SourceStatus::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SourceStatus::Pending | SourceStatus::Running { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SourceStatus::Succeeded { .. })
    }

    /// 失败、封锁、超时、不可用的数据源可以单独重新提交
    pub fn is_resubmittable(&self) -> bool {
        match self {
            SourceStatus::Failed { kind, .. } => kind.is_resubmittable(),
            SourceStatus::Blocked { .. }
            | SourceStatus::TimedOut
            | SourceStatus::Unavailable { .. }
            | SourceStatus::Cancelled => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Running { .. } => "running",
            SourceStatus::Succeeded { .. } => "succeeded",
            SourceStatus::Failed { .. } => "failed",
            SourceStatus::Blocked { .. } => "blocked",
            SourceStatus::TimedOut => "timed_out",
            SourceStatus::Unavailable { .. } => "unavailable",
            SourceStatus::Cancelled => "cancelled",
        }
    }
}

/// 状态变更记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub status: SourceStatus,
}

/// 单个数据源在任务中的状态及历史
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    pub status: SourceStatus,
    pub history: Vec<StatusTransition>,
}

impl SourceState {
    fn new(status: SourceStatus) -> Self {
        let history = vec![StatusTransition {
            at: Utc::now(),
            status: status.clone(),
        }];
        Self { status, history }
    }

    /// 按顺序列出历史中出现过的状态标签
    pub fn status_sequence(&self) -> Vec<&'static str> {
        self.history.iter().map(|t| t.status.label()).collect()
    }
}

/// 任务整体结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// 尚有数据源未结束
    Running,
    /// 全部成功
    FullySuccessful,
    /// 部分成功
    Partial,
    /// 全部失败
    Failed,
}

/// 爬取任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: JobId,
    pub company: Company,
    /// 按请求顺序去重后的数据源
    pub requested: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
    /// 透传给爬虫的参数
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    pub sources: BTreeMap<String, SourceState>,
}

impl CrawlJob {
    pub fn new(
        company: Company,
        requested: Vec<String>,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let sources = requested
            .iter()
            .map(|s| (s.clone(), SourceState::new(SourceStatus::Pending)))
            .collect();
        Self {
            id: JobId::new(),
            company,
            requested,
            submitted_at: Utc::now(),
            completed_at: None,
            cancelled: false,
            params,
            sources,
        }
    }

    /// 更新数据源状态
    ///
    /// 已进入终态的数据源不会再被改写
    pub fn transition(&mut self, source: &str, status: SourceStatus) -> bool {
        let Some(state) = self.sources.get_mut(source) else {
            return false;
        };
        if state.status.is_terminal() {
            return false;
        }
        state.history.push(StatusTransition {
            at: Utc::now(),
            status: status.clone(),
        });
        state.status = status;
        true
    }

    /// 仅记录历史而不改变当前状态，用于重试前的中间结果（如被封锁后等待冷却）
    pub fn record_attempt(&mut self, source: &str, status: SourceStatus) {
        if let Some(state) = self.sources.get_mut(source) {
            if !state.status.is_terminal() {
                state.history.push(StatusTransition {
                    at: Utc::now(),
                    status,
                });
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.sources.values().all(|s| s.status.is_terminal())
    }

    pub fn terminal_count(&self) -> usize {
        self.sources
            .values()
            .filter(|s| s.status.is_terminal())
            .count()
    }

    pub fn outcome(&self) -> JobOutcome {
        if !self.is_complete() {
            return JobOutcome::Running;
        }
        let succeeded = self
            .sources
            .values()
            .filter(|s| s.status.is_success())
            .count();
        if succeeded == self.sources.len() {
            JobOutcome::FullySuccessful
        } else if succeeded == 0 {
            JobOutcome::Failed
        } else {
            JobOutcome::Partial
        }
    }

    /// 可重新提交的数据源
    pub fn resubmittable_sources(&self) -> Vec<String> {
        self.requested
            .iter()
            .filter(|s| {
                self.sources
                    .get(*s)
                    .is_some_and(|state| state.status.is_resubmittable())
            })
            .cloned()
            .collect()
    }

    pub fn status_of(&self, source: &str) -> Option<&SourceStatus> {
        self.sources.get(source).map(|s| &s.status)
    }
}
