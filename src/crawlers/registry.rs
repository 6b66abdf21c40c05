// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::domain::crawler::Crawler;
use crate::domain::models::source::SourceIdError;
use crate::domain::models::{SourceCapabilities, SourceCategory, SourceId};

/// 注册表错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// 重复注册同一数据源
    #[error("Duplicate source: {0}")]
    DuplicateSource(SourceId),
    /// 数据源不存在
    #[error("Unknown source: {0}")]
    NotFound(String),
    /// 数据源标识格式错误
    #[error("Invalid source id: {0}")]
    InvalidId(#[from] SourceIdError),
}

/// 已注册的数据源
pub struct RegisteredSource {
    pub id: SourceId,
    pub crawler: Arc<dyn Crawler>,
    pub capabilities: SourceCapabilities,
}

impl std::fmt::Debug for RegisteredSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredSource")
            .field("id", &self.id)
            .field("crawler", &self.crawler.name())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl RegisteredSource {
    pub fn domain(&self) -> &str {
        &self.capabilities.domain
    }

    pub fn is_enabled(&self) -> bool {
        self.capabilities.enabled
    }
}

/// 数据源目录条目，供前端展示
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub domain: String,
    pub enabled: bool,
}

/// 数据源注册表构建器
///
/// 启动时逐个注册，`build()` 后冻结
#[derive(Debug, Default)]
pub struct SourceRegistryBuilder {
    sources: Vec<Arc<RegisteredSource>>,
    index: HashMap<SourceId, usize>,
}

impl SourceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册数据源，重复标识立即失败
    pub fn register(
        &mut self,
        id: SourceId,
        crawler: Arc<dyn Crawler>,
        capabilities: SourceCapabilities,
    ) -> Result<&mut Self, RegistryError> {
        if self.index.contains_key(&id) {
            return Err(RegistryError::DuplicateSource(id));
        }
        self.index.insert(id.clone(), self.sources.len());
        self.sources.push(Arc::new(RegisteredSource {
            id,
            crawler,
            capabilities,
        }));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn build(self) -> Arc<SourceRegistry> {
        info!("Source registry built with {} sources", self.sources.len());
        Arc::new(SourceRegistry {
            sources: self.sources,
            index: self.index,
        })
    }
}

/// 数据源注册表，构建后只读
#[derive(Debug)]
pub struct SourceRegistry {
    sources: Vec<Arc<RegisteredSource>>,
    index: HashMap<SourceId, usize>,
}

impl SourceRegistry {
    pub fn builder() -> SourceRegistryBuilder {
        SourceRegistryBuilder::new()
    }

    /// 根据标识查找数据源
    pub fn resolve(&self, id: &SourceId) -> Result<Arc<RegisteredSource>, RegistryError> {
        self.index
            .get(id)
            .map(|&i| self.sources[i].clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// 解析字符串标识后查找
    pub fn resolve_str(&self, raw: &str) -> Result<Arc<RegisteredSource>, RegistryError> {
        let id: SourceId = raw.parse()?;
        self.resolve(&id)
    }

    /// 按注册顺序列出某一类别的数据源
    pub fn list(&self, category: SourceCategory) -> Vec<SourceId> {
        self.sources
            .iter()
            .filter(|s| s.id.category() == category)
            .map(|s| s.id.clone())
            .collect()
    }

    /// 按类别分组的目录视图
    pub fn catalog(&self) -> BTreeMap<SourceCategory, Vec<SourceDescriptor>> {
        let mut catalog: BTreeMap<SourceCategory, Vec<SourceDescriptor>> = BTreeMap::new();
        for source in &self.sources {
            catalog
                .entry(source.id.category())
                .or_default()
                .push(SourceDescriptor {
                    id: source.id.to_string(),
                    name: source.id.name().to_string(),
                    display_name: source.capabilities.display_name.clone(),
                    description: source.capabilities.description.clone(),
                    domain: source.capabilities.domain.clone(),
                    enabled: source.capabilities.enabled,
                });
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
