// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::company::{Company, CompanyKey};
use super::source::{SchemaTag, SourceId};

/// 快照标识
///
/// 由 (公司, 数据源, 采集时间) 唯一确定，同时也是存储键
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 模式校验警告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaWarning {
    /// JSON 路径，例如 `violations[2].date`
    pub path: String,
    /// 问题描述
    pub reason: String,
}

impl SchemaWarning {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// 快照元数据，写入文件的 `_metadata` 字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub company: Company,
    pub source_id: SourceId,
    pub captured_at: DateTime<Utc>,
    pub schema_tag: SchemaTag,
    /// 存在警告即表示 SchemaMismatch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SchemaWarning>,
    /// 数据源自身报告的错误（负载中的 `error` 字段）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 爬虫名称
    pub crawler: String,
    /// 本次成功前的尝试次数（含成功那次）
    pub attempts: u32,
    /// 抓取耗时（毫秒）
    pub fetch_duration_ms: u64,
}

/// 快照信封
///
/// 序列化后即为快照文件内容：`source` 加上数据源特有字段，元数据单独放在 `_metadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    /// 数据源短名称
    pub source: String,
    /// 数据源特有字段
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(rename = "_metadata")]
    pub metadata: SnapshotMetadata,
}

/// 已存储的快照，不可变
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub envelope: SnapshotEnvelope,
}

impl Snapshot {
    pub fn company_key(&self) -> &CompanyKey {
        &self.envelope.metadata.company.key
    }

    pub fn source_id(&self) -> &SourceId {
        &self.envelope.metadata.source_id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.envelope.metadata.captured_at
    }

    pub fn schema_mismatch(&self) -> bool {
        !self.envelope.metadata.warnings.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.envelope.fields.get(name)
    }
}

/// 待写入的快照，采集时间由存储在写入时分配
#[derive(Debug, Clone, PartialEq)]
pub struct NewSnapshot {
    pub company: Company,
    pub source_id: SourceId,
    pub schema_tag: SchemaTag,
    pub fields: Map<String, Value>,
    pub warnings: Vec<SchemaWarning>,
    pub error: Option<String>,
    pub crawler: String,
    pub attempts: u32,
    pub fetch_duration_ms: u64,
}

impl NewSnapshot {
    /// 绑定采集时间，生成最终信封
    pub fn into_envelope(self, captured_at: DateTime<Utc>) -> SnapshotEnvelope {
        SnapshotEnvelope {
            source: self.source_id.name().to_string(),
            fields: self.fields,
            metadata: SnapshotMetadata {
                company: self.company,
                source_id: self.source_id,
                captured_at,
                schema_tag: self.schema_tag,
                warnings: self.warnings,
                error: self.error,
                crawler: self.crawler,
                attempts: self.attempts,
                fetch_duration_ms: self.fetch_duration_ms,
            },
        }
    }
}
