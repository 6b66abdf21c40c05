// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 结果规范化（normalizer）：把各数据源的原始负载映射为统一的快照信封并做结构校验
pub mod normalizer;

pub use normalizer::{normalize, NormalizedPayload};
