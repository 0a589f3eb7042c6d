// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entities kept in the per-job coordination namespaces.
//!
//! Workers claim chunks of a job's datums and merges of the resulting
//! hash-trees by writing these entries under `chunk/<job>` and
//! `merge/<job>`; plans partition a job into chunks, and shards assign
//! filesystem ranges to workers per pipeline.

use serde::{Deserialize, Serialize};

/// Datum-index boundaries partitioning a job into chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub chunks: Vec<u64>,
}

/// A filesystem shard a worker has claimed for its pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub shard: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    #[default]
    Running,
    Complete,
    Failed,
}

/// Claim and completion state for one chunk of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkState {
    #[serde(default)]
    pub state: ChunkStatus,
    /// Address of the worker that claimed the chunk.
    #[serde(default)]
    pub address: String,
    /// Datum responsible for a failure, when `state` is failed.
    #[serde(default)]
    pub datum_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    #[default]
    Running,
    Complete,
    Failed,
}

/// Claim state for one merge of a job's hash-trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeState {
    #[serde(default)]
    pub state: MergeStatus,
    /// Object hash of the merged tree, when complete.
    #[serde(default)]
    pub tree: String,
    #[serde(default)]
    pub size_bytes: u64,
}

#[cfg(test)]
#[path = "coord_tests.rs"]
mod tests;
