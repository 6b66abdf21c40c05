// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

use super::storage_repository::StorageError;
use crate::domain::models::{CompanyKey, NewSnapshot, Snapshot, SnapshotId, SourceId};

/// 快照存储错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 底层存储失败
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// 快照文件无法解析
    #[error("Corrupt snapshot {key}: {message}")]
    Corrupt { key: String, message: String },
    /// 序列化失败
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 公司键无效
    #[error("Invalid company key")]
    InvalidCompany,
}

/// 快照只读接口
///
/// 文档解析、情感分析等下游适配器只通过此接口读取数据
#[async_trait]
pub trait SnapshotReader: Send + Sync {
    /// 获取指定公司与数据源的最新快照
    async fn latest(
        &self,
        company: &CompanyKey,
        source: &SourceId,
    ) -> Result<Option<Snapshot>, StoreError>;

    /// 获取指定公司与数据源的全部快照，按采集时间从旧到新
    async fn history(
        &self,
        company: &CompanyKey,
        source: &SourceId,
    ) -> Result<Vec<Snapshot>, StoreError>;

    /// 列出存在快照的所有公司
    async fn list_companies(&self) -> Result<Vec<CompanyKey>, StoreError>;

    /// 列出某公司存在快照的所有数据源
    async fn list_sources(&self, company: &CompanyKey) -> Result<Vec<SourceId>, StoreError>;
}

/// 快照写入接口，只追加
#[async_trait]
pub trait SnapshotStore: SnapshotReader {
    /// 追加一个快照，采集时间在写入时分配
    async fn append(&self, snapshot: NewSnapshot) -> Result<SnapshotId, StoreError>;
}
