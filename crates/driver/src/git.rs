// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Staging of webhook inputs: clone the pushed ref and pin the exact SHA.
//!
//! The input's file content is a github-style push payload. Cloning
//! fetches a ref, not a SHA, so after checkout we verify HEAD actually
//! resolves to the pushed SHA; a silent fallback to the ref tip is
//! rejected.

use crate::error::DriverError;
use crate::object::ObjectStore;
use sluice_core::input::{GitPayload, Input};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

pub(crate) async fn download_git_data(
    store: &Arc<dyn ObjectStore>,
    scratch: &Path,
    input: &Input,
) -> Result<(), DriverError> {
    let raw = store
        .get_file(&input.file.repo, &input.file.commit, &input.file.path)
        .await?;
    let payload: GitPayload = serde_json::from_slice(&raw)?;

    if payload.repository.clone_url.is_empty() {
        return Err(DriverError::GitPayloadField {
            field: "upstream URL",
        });
    }
    if payload.git_ref.is_empty() {
        return Err(DriverError::GitPayloadField {
            field: "updated ref",
        });
    }
    if payload.after.is_empty() {
        return Err(DriverError::GitPayloadField {
            field: "commit SHA",
        });
    }

    let dest = scratch.join(&input.name);
    let branch = branch_from_ref(&payload.git_ref);
    let clone = run_git(
        None,
        &[
            "clone",
            "--branch",
            branch,
            "--single-branch",
            &payload.repository.clone_url,
            &dest.display().to_string(),
        ],
    )
    .await?;
    if !clone.status.success() {
        return Err(DriverError::GitFetch {
            input: input.name.clone(),
            git_ref: payload.git_ref.clone(),
            url: payload.repository.clone_url.clone(),
            detail: stderr_line(&clone),
        });
    }

    let sha = payload.after.as_str();
    let checkout = run_git(Some(&dest), &["checkout", sha]).await?;
    if !checkout.status.success() {
        return Err(DriverError::GitCheckout {
            input: input.name.clone(),
            sha: sha.to_string(),
            detail: stderr_line(&checkout),
        });
    }

    let head = run_git(Some(&dest), &["rev-parse", "HEAD"]).await?;
    if !head.status.success() {
        return Err(DriverError::GitCheckout {
            input: input.name.clone(),
            sha: sha.to_string(),
            detail: stderr_line(&head),
        });
    }
    let resolved = String::from_utf8_lossy(&head.stdout).trim().to_string();
    if resolved != sha {
        return Err(DriverError::GitShaNotFound {
            input: input.name.clone(),
            sha: sha.to_string(),
        });
    }
    Ok(())
}

/// `refs/heads/master` → `master`; bare branch names pass through.
fn branch_from_ref(git_ref: &str) -> &str {
    git_ref
        .strip_prefix("refs/heads/")
        .or_else(|| git_ref.strip_prefix("refs/tags/"))
        .unwrap_or(git_ref)
}

async fn run_git(
    cwd: Option<&Path>,
    args: &[&str],
) -> Result<std::process::Output, DriverError> {
    let mut cmd = tokio::process::Command::new("git");
    cmd.args(args)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    Ok(cmd.output().await?)
}

fn stderr_line(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
