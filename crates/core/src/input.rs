// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Datum input descriptors and the git webhook payload format.

use serde::{Deserialize, Serialize};

/// A file (or directory subtree) in the content-addressed store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub repo: String,
    pub commit: String,
    pub path: String,
}

impl FileRef {
    pub fn new(
        repo: impl Into<String>,
        commit: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            repo: repo.into(),
            commit: commit.into(),
            path: path.into(),
        }
    }
}

/// One input of a datum.
///
/// `name` is the directory component the input is staged under; user code
/// sees it at `<input_dir>/<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    pub file: FileRef,
    /// Materialise as a FIFO that fetches on first read instead of
    /// prefetching.
    #[serde(default)]
    pub lazy: bool,
    /// Create zero-byte placeholders instead of fetching content.
    #[serde(default)]
    pub empty_files: bool,
    /// Set when the input file is a webhook push payload: the repository to
    /// clone instead of pulling from the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
}

impl Input {
    pub fn new(name: impl Into<String>, file: FileRef) -> Self {
        Self {
            name: name.into(),
            file,
            lazy: false,
            empty_files: false,
            git_url: None,
        }
    }
}

/// The subset of a github-style push payload the driver consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct GitPayload {
    #[serde(default)]
    pub repository: GitRepository,
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    /// The commit SHA the push landed on.
    #[serde(default)]
    pub after: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitRepository {
    #[serde(default)]
    pub clone_url: String,
}

#[cfg(test)]
#[path = "input_tests.rs"]
mod tests;
