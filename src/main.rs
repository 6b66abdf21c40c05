// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use riverinfos::anti_detection::AntiDetectionLayer;
use riverinfos::config::settings::Settings;
use riverinfos::crawlers::catalog::build_registry;
use riverinfos::infrastructure::metrics::init_metrics;
use riverinfos::infrastructure::snapshot_store::BlobSnapshotStore;
use riverinfos::infrastructure::storage::create_storage_repository;
use riverinfos::orchestrator::Orchestrator;
use riverinfos::presentation::routes;
use riverinfos::utils::telemetry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration; errors here abort startup
    let settings = Settings::new()?;

    // 2. Initialize logging and metrics
    telemetry::init_telemetry(settings.logging.json);
    info!("Starting riverinfos...");
    init_metrics(&settings.metrics)?;

    // 3. Snapshot store
    let storage = create_storage_repository(&settings.storage)?;
    let store = Arc::new(BlobSnapshotStore::new(storage));
    info!("Snapshot store ready ({})", settings.storage.storage_type);

    // 4. Source registry
    let registry = build_registry(&settings.sources)?;
    info!("Registered {} sources", registry.len());

    // 5. Anti-detection layer and orchestrator
    let anti_detection = Arc::new(AntiDetectionLayer::new(
        settings.anti_detection.to_config(),
    ));
    let orchestrator = Orchestrator::new(
        registry,
        anti_detection,
        store,
        settings.orchestrator.to_config(),
    );

    // 6. Serve the HTTP API
    let app = routes::routes(orchestrator);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
