// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 键已存在，存储只追加不覆盖
    #[error("Key already exists: {0}")]
    AlreadyExists(String),
    /// 存储错误
    #[error("Storage error: {0}")]
    Other(String),
}

/// 存储仓库特质
///
/// 定义存储数据访问接口
#[async_trait]
pub trait StorageRepository: Send + Sync {
    /// 使用指定键保存数据，键已存在时返回 `AlreadyExists`
    async fn save_new(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// 根据键从存储中检索数据
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// 列出以指定前缀开头的所有键，按字典序排列
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
