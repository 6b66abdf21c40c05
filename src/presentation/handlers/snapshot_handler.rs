// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::{Extension, Path},
    Json,
};
use std::sync::Arc;

use crate::application::dto::snapshot_response::SnapshotDto;
use crate::domain::models::{Company, CompanyKey, SourceId};
use crate::domain::repositories::snapshot_repository::StoreError;
use crate::orchestrator::Orchestrator;
use crate::presentation::errors::{AppError, NotFound};

/// 解析路径中的公司段
///
/// 优先按已存储的标准化键精确匹配（即 `/v1/companies` 返回的值），
/// 无匹配时再按显示名称标准化。
async fn company_key(orchestrator: &Orchestrator, raw: &str) -> Result<CompanyKey, AppError> {
    let trimmed = raw.trim();
    let exact = CompanyKey::from_normalized(trimmed);
    let storable = !trimmed.contains('/') && trimmed != "." && trimmed != "..";
    if storable
        && !exact.is_empty()
        && !orchestrator.store().list_sources(&exact).await?.is_empty()
    {
        return Ok(exact);
    }

    let key = Company::new(raw).key;
    if key.is_empty() {
        return Err(StoreError::InvalidCompany.into());
    }
    Ok(key)
}

fn source_id(category: &str, name: &str) -> Result<SourceId, AppError> {
    Ok(format!("{}/{}", category, name).parse::<SourceId>()?)
}

/// 列出有快照的公司
pub async fn list_companies(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
) -> Result<Json<Vec<CompanyKey>>, AppError> {
    Ok(Json(orchestrator.store().list_companies().await?))
}

/// 列出某公司有快照的数据源
pub async fn list_company_sources(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(company): Path<String>,
) -> Result<Json<Vec<SourceId>>, AppError> {
    let key = company_key(&orchestrator, &company).await?;
    Ok(Json(orchestrator.store().list_sources(&key).await?))
}

/// 最新快照
pub async fn latest_snapshot(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path((company, category, name)): Path<(String, String, String)>,
) -> Result<Json<SnapshotDto>, AppError> {
    let key = company_key(&orchestrator, &company).await?;
    let source = source_id(&category, &name)?;
    let snapshot = orchestrator
        .store()
        .latest(&key, &source)
        .await?
        .ok_or_else(|| NotFound(format!("snapshot for {}/{}", key, source)))?;
    Ok(Json(snapshot.into()))
}

/// 全部快照，按采集时间从旧到新
pub async fn snapshot_history(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path((company, category, name)): Path<(String, String, String)>,
) -> Result<Json<Vec<SnapshotDto>>, AppError> {
    let key = company_key(&orchestrator, &company).await?;
    let source = source_id(&category, &name)?;
    let history = orchestrator.store().history(&key, &source).await?;
    Ok(Json(history.into_iter().map(SnapshotDto::from).collect()))
}
