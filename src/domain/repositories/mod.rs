// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 具体实现由基础设施层提供：
/// - 快照仓库（snapshot_repository）：只追加的快照写入与只读查询
/// - 存储仓库（storage_repository）：按键存取字节的对象存储
pub mod snapshot_repository;
pub mod storage_repository;
