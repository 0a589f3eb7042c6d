// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for store operations.

use thiserror::Error;

/// Errors surfaced by collections and transactions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A `get` or `update` addressed a key that does not exist.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// A transaction kept losing its commit race.
    #[error("transaction aborted after {attempts} conflicting attempts")]
    TooManyConflicts { attempts: u32 },

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),

    /// An application error raised inside a transaction callback.
    #[error("{0}")]
    Aborted(String),
}

impl StoreError {
    /// Abort a transaction with an application-level message.
    pub fn aborted(message: impl Into<String>) -> Self {
        StoreError::Aborted(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
