// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Serialize;

use crate::domain::models::{CrawlJob, JobOutcome};

/// 任务状态响应
#[derive(Debug, Serialize)]
pub struct JobStatusDto {
    #[serde(flatten)]
    pub job: CrawlJob,
    pub outcome: JobOutcome,
    pub terminal_count: usize,
}

impl From<CrawlJob> for JobStatusDto {
    fn from(job: CrawlJob) -> Self {
        Self {
            outcome: job.outcome(),
            terminal_count: job.terminal_count(),
            job,
        }
    }
}
