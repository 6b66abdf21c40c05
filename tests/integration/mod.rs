// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod anti_detection_test;
pub mod api_test;
pub mod helpers;
pub mod orchestrator_test;
