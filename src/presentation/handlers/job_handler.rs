// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::application::dto::job_request::CreateJobRequestDto;
use crate::application::dto::job_response::JobStatusDto;
use crate::domain::models::{Company, JobId};
use crate::orchestrator::Orchestrator;
use crate::presentation::errors::AppError;

/// 提交爬取任务，立即返回 202 和初始状态
pub async fn create_job(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Json(payload): Json<CreateJobRequestDto>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let handle = orchestrator.submit(
        Company::new(payload.company),
        payload.sources,
        payload.params,
    )?;
    Ok((StatusCode::ACCEPTED, Json(JobStatusDto::from(handle.status()))))
}

/// 查询任务状态
pub async fn get_job(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusDto>, AppError> {
    let job = orchestrator.get_status(&JobId(id))?;
    Ok(Json(job.into()))
}

/// 取消任务
pub async fn cancel_job(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusDto>, AppError> {
    let job = orchestrator.cancel(&JobId(id))?;
    Ok(Json(job.into()))
}

/// 以新任务重新提交失败的数据源
pub async fn resubmit_job(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let handle = orchestrator.resubmit(&JobId(id))?;
    Ok((StatusCode::ACCEPTED, Json(JobStatusDto::from(handle.status()))))
}
