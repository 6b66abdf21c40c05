// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

/// 创建爬取任务请求
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateJobRequestDto {
    /// 公司名称
    #[validate(length(min = 1, max = 256))]
    pub company: String,
    /// 数据源标识列表，形如 `news/google`
    #[validate(length(min = 1, max = 64), custom(function = "validate_sources"))]
    pub sources: Vec<String>,
    /// 透传给爬虫的参数
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn validate_sources(sources: &[String]) -> Result<(), ValidationError> {
    if sources.iter().any(|s| s.trim().is_empty()) {
        return Err(ValidationError::new("empty_source_id"));
    }
    Ok(())
}

/// 数据源目录查询
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct SourceQueryDto {
    /// 只列出该类别
    #[validate(length(min = 1))]
    pub category: Option<String>,
}
