// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod job_request;
pub mod job_response;
pub mod snapshot_response;
