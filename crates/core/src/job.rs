// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and pipeline records kept in the coordination store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Starting,
    Running,
    Merging,
    Egressing,
    Success,
    Failure,
    Killed,
}

impl JobState {
    /// Terminal states are never left once entered.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure | JobState::Killed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Starting => "starting",
            JobState::Running => "running",
            JobState::Merging => "merging",
            JobState::Egressing => "egressing",
            JobState::Success => "success",
            JobState::Failure => "failure",
            JobState::Killed => "killed",
        };
        f.write_str(s)
    }
}

/// The job entry the driver reads and writes, keyed by job id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job: String,
    pub pipeline: String,
    #[serde(default)]
    pub state: JobState,
    /// Human-readable explanation for the current state.
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub data_processed: u64,
    #[serde(default)]
    pub data_skipped: u64,
    #[serde(default)]
    pub data_failed: u64,
    #[serde(default)]
    pub data_recovered: u64,
    #[serde(default)]
    pub data_total: u64,
}

impl JobInfo {
    pub fn new(job: impl Into<String>, pipeline: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            pipeline: pipeline.into(),
            ..Self::default()
        }
    }
}

/// The pipeline entry, keyed by pipeline name: a tally of jobs per state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub pipeline: String,
    #[serde(default)]
    pub job_counts: BTreeMap<JobState, u64>,
}

impl PipelineRecord {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            job_counts: BTreeMap::new(),
        }
    }

    pub fn count(&self, state: JobState) -> u64 {
        self.job_counts.get(&state).copied().unwrap_or(0)
    }

    /// Sum of counts across all states.
    pub fn total_jobs(&self) -> u64 {
        self.job_counts.values().sum()
    }

    pub fn increment(&mut self, state: JobState) {
        *self.job_counts.entry(state).or_insert(0) += 1;
    }

    /// Decrement the count for `state`, saturating at zero.
    pub fn decrement(&mut self, state: JobState) {
        if let Some(count) = self.job_counts.get_mut(&state) {
            *count = count.saturating_sub(1);
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
