// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline specification: what to run for each datum, and how.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How user code is invoked for each datum.
///
/// The command array is exec'd directly (no shell). `stdin` lines are joined
/// with newlines and fed to the child; `err_cmd`/`err_stdin` describe the
/// optional error-handling command the spawner may run after a failed datum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stdin: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub err_cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub err_stdin: Vec<String>,
    /// Non-zero exit codes that still count as success.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accept_return_codes: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// `"user"` or `"user:group"`, each side a name or a numeric id.
    /// When unset, user code runs as the container's default identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Transform {
    /// Whether `code` is an acceptable exit code for user code.
    pub fn accepts_exit_code(&self, code: i32) -> bool {
        code == 0 || self.accept_return_codes.contains(&code)
    }
}

/// How many worker replicas a pipeline should run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelismSpec {
    /// A fixed replica count. Zero means "platform default" (one).
    Constant(u64),
    /// A multiple of the cluster's node count, rounded, minimum one.
    Coefficient(f64),
}

impl Default for ParallelismSpec {
    fn default() -> Self {
        ParallelismSpec::Constant(1)
    }
}

/// The read-only pipeline spec the driver executes against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub id: String,
    pub name: String,
    pub transform: Transform,
    #[serde(default)]
    pub parallelism: ParallelismSpec,
    /// Spouts are long-running pipelines that write to a FIFO at `out`
    /// instead of an output directory.
    #[serde(default)]
    pub spout: bool,
    /// Default per-datum timeout; a per-call timeout overrides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum_timeout: Option<Duration>,
}

impl PipelineSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>, transform: Transform) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transform,
            parallelism: ParallelismSpec::default(),
            spout: false,
            datum_timeout: None,
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
