// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 公司（company）：显示名称与标准化键
/// - 数据源（source）：数据源标识、类别与能力元数据
/// - 爬取任务（job）：一次提交及其每个数据源的状态
/// - 快照（snapshot）：不可变的采集结果
pub mod company;
pub mod job;
pub mod snapshot;
pub mod source;

pub use company::{normalize_company_name, Company, CompanyKey};
pub use job::{CrawlJob, FailureKind, JobId, JobOutcome, SourceState, SourceStatus};
pub use snapshot::{NewSnapshot, SchemaWarning, Snapshot, SnapshotEnvelope, SnapshotId};
pub use source::{
    RateLimitClass, SchemaTag, SourceCapabilities, SourceCategory, SourceId, SourceIdError,
};
