// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The key-value backend consumed by transactions.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A value together with the store revision that last wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: Vec<u8>,
    pub version: u64,
}

/// A commit guard: the key must currently be at exactly this version.
/// Version zero means the key must be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionGuard {
    pub key: String,
    pub version: u64,
}

/// A write applied when a commit's guards all hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// The transactional key-value store the driver coordinates through.
///
/// `commit` is the only mutation: it atomically applies `ops` iff every
/// guard holds, returning the commit revision, or `None` on conflict.
/// Production deployments back this with an external store; [`MemKv`] is
/// the in-process implementation used by tests and embedded setups.
#[async_trait]
pub trait Kv: Send + Sync {
    async fn get(&self, key: &str) -> Option<Versioned>;

    /// All entries whose key starts with `prefix`, in key order.
    async fn list(&self, prefix: &str) -> Vec<(String, Versioned)>;

    async fn commit(&self, guards: &[VersionGuard], ops: &[KvOp]) -> Option<u64>;
}

/// In-process [`Kv`] with per-key versions drawn from a global revision.
#[derive(Default)]
pub struct MemKv {
    inner: Mutex<MemKvInner>,
}

#[derive(Default)]
struct MemKvInner {
    entries: BTreeMap<String, Versioned>,
    revision: u64,
}

impl MemKv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current store revision (last committed).
    pub fn revision(&self) -> u64 {
        self.inner.lock().revision
    }

    /// Number of live keys; test convenience.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

#[async_trait]
impl Kv for MemKv {
    async fn get(&self, key: &str) -> Option<Versioned> {
        self.inner.lock().entries.get(key).cloned()
    }

    async fn list(&self, prefix: &str) -> Vec<(String, Versioned)> {
        let inner = self.inner.lock();
        inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    async fn commit(&self, guards: &[VersionGuard], ops: &[KvOp]) -> Option<u64> {
        let mut inner = self.inner.lock();
        for guard in guards {
            let current = inner.entries.get(&guard.key).map(|v| v.version).unwrap_or(0);
            if current != guard.version {
                return None;
            }
        }
        if ops.is_empty() {
            return Some(inner.revision);
        }
        inner.revision += 1;
        let revision = inner.revision;
        for op in ops {
            match op {
                KvOp::Put { key, value } => {
                    inner.entries.insert(
                        key.clone(),
                        Versioned {
                            value: value.clone(),
                            version: revision,
                        },
                    );
                }
                KvOp::Delete { key } => {
                    inner.entries.remove(key);
                }
            }
        }
        Some(revision)
    }
}

#[cfg(test)]
#[path = "kv_tests.rs"]
mod tests;
