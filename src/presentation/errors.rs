// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::models::SourceIdError;
use crate::domain::repositories::snapshot_repository::StoreError;
use crate::orchestrator::OrchestratorError;

/// 请求的资源不存在
#[derive(Error, Debug)]
#[error("{0} not found")]
pub struct NotFound(pub String);

/// 应用错误类型
///
/// 封装所有可能的应用层错误，按错误类型映射为 HTTP 状态码
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if let Some(e) = self.0.downcast_ref::<OrchestratorError>() {
            return match e {
                OrchestratorError::JobNotFound(_) => StatusCode::NOT_FOUND,
                OrchestratorError::InvalidRequest(_)
                | OrchestratorError::JobNotComplete(_)
                | OrchestratorError::NothingToResubmit(_) => StatusCode::BAD_REQUEST,
            };
        }
        if self.0.downcast_ref::<NotFound>().is_some() {
            return StatusCode::NOT_FOUND;
        }
        if self.0.downcast_ref::<validator::ValidationErrors>().is_some()
            || self.0.downcast_ref::<SourceIdError>().is_some()
            || matches!(
                self.0.downcast_ref::<StoreError>(),
                Some(StoreError::InvalidCompany)
            )
        {
            return StatusCode::BAD_REQUEST;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.0);
        }
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
