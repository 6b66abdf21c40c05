// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, SubsecRound, Utc};
use dashmap::DashMap;
use metrics::counter;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::models::{
    CompanyKey, NewSnapshot, Snapshot, SnapshotEnvelope, SnapshotId, SourceId,
};
use crate::domain::repositories::snapshot_repository::{SnapshotReader, SnapshotStore, StoreError};
use crate::domain::repositories::storage_repository::{StorageError, StorageRepository};

const ROOT: &str = "companies";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y%m%dT%H%M%S%.fZ";
/// 键冲突（例如多进程写同一时刻）时重新分配时间的次数
const MAX_KEY_COLLISIONS: usize = 3;

/// 基于对象存储的快照仓库
///
/// 键布局：`companies/<公司键>/<类别>/<名称>/<时间戳>.json`，时间戳按字典序即按时间排序
pub struct BlobSnapshotStore {
    storage: Arc<dyn StorageRepository>,
    /// 每个 (公司, 数据源) 最近分配的采集时间
    last_captured: DashMap<(CompanyKey, SourceId), DateTime<Utc>>,
}

impl BlobSnapshotStore {
    pub fn new(storage: Arc<dyn StorageRepository>) -> Self {
        Self {
            storage,
            last_captured: DashMap::new(),
        }
    }

    fn prefix(company: &CompanyKey, source: &SourceId) -> String {
        format!(
            "{}/{}/{}/{}/",
            ROOT,
            company,
            source.category(),
            source.name()
        )
    }

    fn key_for(company: &CompanyKey, source: &SourceId, captured_at: DateTime<Utc>) -> String {
        format!(
            "{}{}.json",
            Self::prefix(company, source),
            captured_at.format(TIMESTAMP_FORMAT)
        )
    }

    /// 从存储键解析采集时间
    fn parse_timestamp(key: &str) -> Option<DateTime<Utc>> {
        let file = key.rsplit('/').next()?;
        let stem = file.strip_suffix(".json")?;
        NaiveDateTime::parse_from_str(stem, TIMESTAMP_PARSE_FORMAT)
            .ok()
            .map(|t| t.and_utc())
    }

    /// 分配严格单调递增的采集时间
    ///
    /// 首次写某个键时从存储读取已有的最新时间，保证重启后仍然单调；
    /// 读取在锁外进行，锁内只做比较和赋值
    async fn assign_captured_at(
        &self,
        company: &CompanyKey,
        source: &SourceId,
    ) -> Result<DateTime<Utc>, StoreError> {
        let map_key = (company.clone(), source.clone());
        if !self.last_captured.contains_key(&map_key) {
            let persisted = self
                .storage
                .list(&Self::prefix(company, source))
                .await?
                .iter()
                .filter_map(|k| Self::parse_timestamp(k))
                .max()
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            self.last_captured
                .entry(map_key.clone())
                .and_modify(|last| *last = (*last).max(persisted))
                .or_insert(persisted);
        }

        let now = Utc::now().trunc_subsecs(6);
        let mut last = self
            .last_captured
            .entry(map_key)
            .or_insert(DateTime::<Utc>::MIN_UTC);
        let assigned = now.max(*last + ChronoDuration::microseconds(1));
        *last = assigned;
        Ok(assigned)
    }

    async fn load(&self, key: &str) -> Result<Option<Snapshot>, StoreError> {
        let Some(bytes) = self.storage.get(key).await? else {
            return Ok(None);
        };
        let envelope: SnapshotEnvelope =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(Some(Snapshot {
            id: SnapshotId::new(key),
            envelope,
        }))
    }

    async fn snapshot_keys(
        &self,
        company: &CompanyKey,
        source: &SourceId,
    ) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .storage
            .list(&Self::prefix(company, source))
            .await?
            .into_iter()
            .filter(|k| Self::parse_timestamp(k).is_some())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl SnapshotReader for BlobSnapshotStore {
    async fn latest(
        &self,
        company: &CompanyKey,
        source: &SourceId,
    ) -> Result<Option<Snapshot>, StoreError> {
        for key in self.snapshot_keys(company, source).await?.iter().rev() {
            match self.load(key).await {
                Ok(Some(snapshot)) => return Ok(Some(snapshot)),
                Ok(None) => continue,
                Err(StoreError::Corrupt { key, message }) => {
                    warn!("Skipping corrupt snapshot {}: {}", key, message);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn history(
        &self,
        company: &CompanyKey,
        source: &SourceId,
    ) -> Result<Vec<Snapshot>, StoreError> {
        let mut snapshots = Vec::new();
        for key in self.snapshot_keys(company, source).await? {
            match self.load(&key).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => {}
                Err(StoreError::Corrupt { key, message }) => {
                    warn!("Skipping corrupt snapshot {}: {}", key, message);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(snapshots)
    }

    async fn list_companies(&self) -> Result<Vec<CompanyKey>, StoreError> {
        let keys = self.storage.list(&format!("{}/", ROOT)).await?;
        let companies: BTreeSet<String> = keys
            .iter()
            .filter_map(|k| k.split('/').nth(1))
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        Ok(companies
            .into_iter()
            .map(CompanyKey::from_normalized)
            .collect())
    }

    async fn list_sources(&self, company: &CompanyKey) -> Result<Vec<SourceId>, StoreError> {
        if company.is_empty() {
            return Err(StoreError::InvalidCompany);
        }
        let keys = self
            .storage
            .list(&format!("{}/{}/", ROOT, company))
            .await?;
        let sources: BTreeSet<SourceId> = keys
            .iter()
            .filter_map(|k| {
                let mut parts = k.split('/').skip(2);
                let category = parts.next()?;
                let name = parts.next()?;
                format!("{}/{}", category, name).parse().ok()
            })
            .collect();
        Ok(sources.into_iter().collect())
    }
}

#[async_trait]
impl SnapshotStore for BlobSnapshotStore {
    async fn append(&self, snapshot: NewSnapshot) -> Result<SnapshotId, StoreError> {
        if !snapshot.company.is_valid() {
            return Err(StoreError::InvalidCompany);
        }
        let company = snapshot.company.key.clone();
        let source = snapshot.source_id.clone();

        for _ in 0..MAX_KEY_COLLISIONS {
            let captured_at = self.assign_captured_at(&company, &source).await?;
            let key = Self::key_for(&company, &source, captured_at);
            let envelope = snapshot.clone().into_envelope(captured_at);
            let body = serde_json::to_vec_pretty(&envelope)?;

            match self.storage.save_new(&key, &body).await {
                Ok(()) => {
                    debug!("Appended snapshot {}", key);
                    counter!("snapshots_appended_total", "source" => source.to_string())
                        .increment(1);
                    return Ok(SnapshotId::new(key));
                }
                Err(StorageError::AlreadyExists(existing)) => {
                    warn!("Snapshot key {} already exists, reassigning", existing);
                    // Force a reload of the latest persisted timestamp.
                    self.last_captured.remove(&(company.clone(), source.clone()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Storage(StorageError::Other(format!(
            "could not allocate a unique snapshot key for {}/{}",
            company, source
        ))))
    }
}
