// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：公司、数据源、任务和快照
/// - 爬虫契约（crawler）：所有数据源爬虫实现的统一接口
/// - 仓库接口（repositories）：快照存储与底层对象存储的抽象
/// - 服务（services）：结果规范化
pub mod crawler;
pub mod models;
pub mod repositories;
pub mod services;
