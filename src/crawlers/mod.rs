// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 爬虫模块
///
/// - 注册表（registry）：数据源目录及其能力元数据
/// - 默认目录（catalog）：内置数据源与按配置构建注册表
/// - 通用HTTP爬虫（http_crawler）：配置驱动的爬虫契约参考实现
pub mod catalog;
pub mod http_crawler;
pub mod registry;

pub use catalog::{build_registry, default_catalog, PlaceholderCrawler};
pub use http_crawler::{HttpCrawler, HttpCrawlerConfig};
pub use registry::{
    RegisteredSource, RegistryError, SourceDescriptor, SourceRegistry,
    SourceRegistryBuilder,
};
