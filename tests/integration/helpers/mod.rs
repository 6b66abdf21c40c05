// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use riverinfos::anti_detection::{AntiDetectionConfig, AntiDetectionLayer};
use riverinfos::crawlers::registry::SourceRegistry;
use riverinfos::domain::crawler::{CrawlOutput, Crawler, CrawlerError, FetchOptions};
use riverinfos::domain::models::{
    Company, CompanyKey, NewSnapshot, SchemaTag, Snapshot, SnapshotId, SourceCapabilities,
    SourceId,
};
use riverinfos::domain::repositories::snapshot_repository::{
    SnapshotReader, SnapshotStore, StoreError,
};
use riverinfos::domain::repositories::storage_repository::StorageError;
use riverinfos::infrastructure::snapshot_store::BlobSnapshotStore;
use riverinfos::infrastructure::storage::InMemoryStorage;
use riverinfos::orchestrator::{Orchestrator, OrchestratorConfig};
use riverinfos::utils::retry_policy::RetryPolicy;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 按脚本依次返回结果的爬虫，脚本耗尽后重复最后一个结果
#[allow(dead_code)]
pub struct ScriptedCrawler {
    name: String,
    script: Mutex<VecDeque<Result<Value, CrawlerError>>>,
    last: Mutex<Option<Result<Value, CrawlerError>>>,
    delay: Duration,
    calls: Mutex<Vec<(Instant, String)>>,
    active: Mutex<HashSet<String>>,
    max_active: Mutex<usize>,
    identity_overlap: Mutex<bool>,
}

#[allow(dead_code)]
impl ScriptedCrawler {
    pub fn new(name: &str, script: Vec<Result<Value, CrawlerError>>) -> Arc<Self> {
        Self::with_delay(name, script, Duration::ZERO)
    }

    pub fn with_delay(
        name: &str,
        script: Vec<Result<Value, CrawlerError>>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            delay,
            calls: Mutex::new(Vec::new()),
            active: Mutex::new(HashSet::new()),
            max_active: Mutex::new(0),
            identity_overlap: Mutex::new(false),
        })
    }

    pub fn always(name: &str, result: Result<Value, CrawlerError>) -> Arc<Self> {
        Self::new(name, vec![result])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn identities(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, id)| id.clone()).collect()
    }

    pub fn max_active(&self) -> usize {
        *self.max_active.lock()
    }

    pub fn saw_identity_overlap(&self) -> bool {
        *self.identity_overlap.lock()
    }

    fn next_result(&self) -> Result<Value, CrawlerError> {
        let mut script = self.script.lock();
        let mut last = self.last.lock();
        match script.pop_front() {
            Some(result) => {
                *last = Some(result.clone());
                result
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(CrawlerError::Parse("empty script".to_string()))),
        }
    }
}

#[async_trait]
impl Crawler for ScriptedCrawler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        _company: &Company,
        options: &FetchOptions,
    ) -> Result<CrawlOutput, CrawlerError> {
        let identity = options.profile.identity_id().to_string();
        self.calls.lock().push((Instant::now(), identity.clone()));
        {
            let mut active = self.active.lock();
            if !active.insert(identity.clone()) {
                *self.identity_overlap.lock() = true;
            }
            let mut max = self.max_active.lock();
            *max = (*max).max(active.len());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.active.lock().remove(&identity);
        self.next_result().map(CrawlOutput::from)
    }
}

/// 每次调用都崩溃的爬虫
pub struct PanickingCrawler;

#[async_trait]
impl Crawler for PanickingCrawler {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn fetch(
        &self,
        _company: &Company,
        _options: &FetchOptions,
    ) -> Result<CrawlOutput, CrawlerError> {
        panic!("parser exploded");
    }
}

/// 对指定数据源写入失败的快照存储
pub struct FailingStore {
    inner: Arc<BlobSnapshotStore>,
    failing: SourceId,
}

impl FailingStore {
    pub fn new(inner: Arc<BlobSnapshotStore>, failing: SourceId) -> Self {
        Self { inner, failing }
    }
}

#[async_trait]
impl SnapshotReader for FailingStore {
    async fn latest(
        &self,
        company: &CompanyKey,
        source: &SourceId,
    ) -> Result<Option<Snapshot>, StoreError> {
        self.inner.latest(company, source).await
    }

    async fn history(
        &self,
        company: &CompanyKey,
        source: &SourceId,
    ) -> Result<Vec<Snapshot>, StoreError> {
        self.inner.history(company, source).await
    }

    async fn list_companies(&self) -> Result<Vec<CompanyKey>, StoreError> {
        self.inner.list_companies().await
    }

    async fn list_sources(&self, company: &CompanyKey) -> Result<Vec<SourceId>, StoreError> {
        self.inner.list_sources(company).await
    }
}

#[async_trait]
impl SnapshotStore for FailingStore {
    async fn append(&self, snapshot: NewSnapshot) -> Result<SnapshotId, StoreError> {
        if snapshot.source_id == self.failing {
            return Err(StoreError::Storage(StorageError::Other(
                "disk full".to_string(),
            )));
        }
        self.inner.append(snapshot).await
    }
}

pub fn source_id(raw: &str) -> SourceId {
    raw.parse().expect("valid source id")
}

pub fn memory_store() -> Arc<BlobSnapshotStore> {
    Arc::new(BlobSnapshotStore::new(Arc::new(InMemoryStorage::new())))
}

/// 关闭抖动的反检测配置，便于在暂停时钟下断言时间
pub fn quiet_anti_detection() -> AntiDetectionConfig {
    AntiDetectionConfig {
        jitter_max: Duration::ZERO,
        ..AntiDetectionConfig::default()
    }
}

pub fn test_orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_concurrent_fetches: 8,
        fetch_timeout: Duration::from_secs(30),
        retry: RetryPolicy {
            enable_jitter: false,
            ..RetryPolicy::default()
        },
        job_retention: Duration::from_secs(3600),
    }
}

/// 测试用注册表条目
pub struct TestSource {
    pub id: &'static str,
    pub crawler: Arc<dyn Crawler>,
    pub capabilities: SourceCapabilities,
}

impl TestSource {
    pub fn new(
        id: &'static str,
        crawler: Arc<dyn Crawler>,
        domain: &str,
        schema: SchemaTag,
    ) -> Self {
        Self {
            id,
            crawler,
            capabilities: SourceCapabilities::new(domain, schema),
        }
    }
}

pub fn registry(sources: Vec<TestSource>) -> Arc<SourceRegistry> {
    let mut builder = SourceRegistry::builder();
    for source in sources {
        builder
            .register(source_id(source.id), source.crawler, source.capabilities)
            .expect("register source");
    }
    builder.build()
}

pub fn orchestrator(
    registry: Arc<SourceRegistry>,
    store: Arc<dyn SnapshotStore>,
    anti_detection: AntiDetectionConfig,
    config: OrchestratorConfig,
) -> Arc<Orchestrator> {
    Orchestrator::new(
        registry,
        Arc::new(AntiDetectionLayer::new(anti_detection)),
        store,
        config,
    )
}
