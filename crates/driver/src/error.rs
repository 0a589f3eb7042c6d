// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for driver operations.

use sluice_store::StoreError;
use thiserror::Error;

/// Errors surfaced while executing one datum.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The pipeline spec carries no command to run.
    #[error("invalid pipeline transform, no command specified")]
    NoCommand,

    /// The transform named a user that is not in the passwd file.
    #[error("user {user} not found")]
    UserNotFound { user: String },

    /// The transform named a group that is not in the group file.
    #[error("group {group} not found")]
    GroupNotFound { group: String },

    /// A passwd or group entry had a non-numeric id column.
    #[error("malformed {file} entry for {name}: {detail}")]
    MalformedIdentityEntry {
        file: &'static str,
        name: String,
        detail: String,
    },

    /// User code outlived its per-datum deadline.
    #[error("datum timed out")]
    DatumTimedOut,

    /// The driver's context was cancelled.
    #[error("driver cancelled")]
    Cancelled,

    /// User code exited with a code outside the accepted set.
    #[error("user code failed with exit code {code}")]
    UserCodeFailed { code: i32 },

    #[error("failed to start user code: {source}")]
    UserCodeStart {
        #[source]
        source: std::io::Error,
    },

    /// User code left a named pipe (or similar) in the output tree.
    #[error("cannot upload special file: {path}")]
    SpecialFile { path: String },

    #[error("file path is not valid utf-8: {path}")]
    InvalidUtf8Path { path: String },

    /// A webhook payload was missing a required field.
    #[error("git hook payload does not specify the {field}")]
    GitPayloadField { field: &'static str },

    #[error("invalid git hook payload: {0}")]
    GitPayloadParse(#[from] serde_json::Error),

    #[error("serializing datum tree: {0}")]
    TreeSerialize(#[source] serde_json::Error),

    #[error("error fetching ref {git_ref} for input {input} from {url}: {detail}")]
    GitFetch {
        input: String,
        git_ref: String,
        url: String,
        detail: String,
    },

    #[error("error checking out SHA {sha} for input {input}: {detail}")]
    GitCheckout {
        input: String,
        sha: String,
        detail: String,
    },

    /// The clone checked out a ref that does not resolve to the pushed SHA.
    #[error("could not find SHA {sha} for input {input}")]
    GitShaNotFound { input: String, sha: String },

    #[error("object store: {0}")]
    ObjectStore(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Whether this error is the per-datum timeout.
    pub fn is_datum_timeout(&self) -> bool {
        matches!(self, DriverError::DatumTimedOut)
    }

    /// Whether this error means user code ran and failed (as opposed to
    /// the driver failing around it). The spawner uses this to decide
    /// whether to invoke the pipeline's error-handling command.
    pub fn is_user_code_failure(&self) -> bool {
        matches!(
            self,
            DriverError::UserCodeFailed { .. } | DriverError::DatumTimedOut
        )
    }
}
