// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::{Extension, Query},
    Json,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

use crate::application::dto::job_request::SourceQueryDto;
use crate::crawlers::registry::SourceDescriptor;
use crate::domain::models::SourceCategory;
use crate::orchestrator::Orchestrator;
use crate::presentation::errors::AppError;

/// 按类别列出已注册的数据源
pub async fn list_sources(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Query(query): Query<SourceQueryDto>,
) -> Result<Json<BTreeMap<SourceCategory, Vec<SourceDescriptor>>>, AppError> {
    query.validate()?;
    let mut catalog = orchestrator.registry().catalog();
    if let Some(raw) = query.category.as_deref() {
        let category: SourceCategory = raw.parse()?;
        catalog.retain(|c, _| *c == category);
    }
    Ok(Json(catalog))
}
