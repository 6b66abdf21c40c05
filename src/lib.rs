// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 反检测模块
///
/// 身份池、请求节奏、封锁检测与域名冷却
pub mod anti_detection;

/// 应用程序模块
///
/// 包含 HTTP 接口使用的数据传输对象
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 爬虫模块
///
/// 数据源注册表、默认目录和通用 HTTP 爬虫
pub mod crawlers;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 基础设施模块
///
/// 提供外部服务集成，如对象存储、快照存储和指标导出
pub mod infrastructure;

/// 调度器模块
pub mod orchestrator;

/// 表示层模块
///
/// 处理HTTP请求和响应，包括路由和处理器
pub mod presentation;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;
