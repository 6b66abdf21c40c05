// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 依赖领域层的抽象接口，提供具体实现：
/// - 指标（metrics）：Prometheus 导出器
/// - 快照仓库（snapshot_store）：基于对象存储的只追加快照仓库
/// - 存储（storage）：本地文件系统、S3 和内存存储
pub mod metrics;
pub mod snapshot_store;
pub mod storage;
