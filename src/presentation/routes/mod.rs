// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::orchestrator::Orchestrator;
use crate::presentation::handlers::{job_handler, snapshot_handler, source_handler};

/// 创建应用路由
///
/// # 参数
///
/// * `orchestrator` - 调度器，处理器通过它访问注册表与快照存储
///
/// # 返回值
///
/// 返回配置好的路由
pub fn routes(orchestrator: Arc<Orchestrator>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/v1/version", get(version));

    let api_routes = Router::new()
        .route("/v1/jobs", post(job_handler::create_job))
        .route(
            "/v1/jobs/{id}",
            get(job_handler::get_job).delete(job_handler::cancel_job),
        )
        .route("/v1/jobs/{id}/resubmit", post(job_handler::resubmit_job))
        .route("/v1/sources", get(source_handler::list_sources))
        .route("/v1/companies", get(snapshot_handler::list_companies))
        .route(
            "/v1/companies/{company}/sources",
            get(snapshot_handler::list_company_sources),
        )
        .route(
            "/v1/companies/{company}/sources/{category}/{name}/latest",
            get(snapshot_handler::latest_snapshot),
        )
        .route(
            "/v1/companies/{company}/sources/{category}/{name}/history",
            get(snapshot_handler::snapshot_history),
        );

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(Extension(orchestrator))
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
