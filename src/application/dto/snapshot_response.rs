// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::models::{Snapshot, SnapshotEnvelope, SnapshotId};

/// 快照响应
#[derive(Debug, Serialize)]
pub struct SnapshotDto {
    pub id: SnapshotId,
    pub captured_at: DateTime<Utc>,
    pub schema_mismatch: bool,
    pub content: SnapshotEnvelope,
}

impl From<Snapshot> for SnapshotDto {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            captured_at: snapshot.captured_at(),
            schema_mismatch: snapshot.schema_mismatch(),
            id: snapshot.id,
            content: snapshot.envelope,
        }
    }
}
