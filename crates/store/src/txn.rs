// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optimistic transactions over the key-value backend.
//!
//! A [`Txn`] records every key it reads together with the version it saw,
//! and buffers its writes. Commit submits the read set as guards and the
//! write set as ops in a single atomic request; if any guard fails, the
//! caller's body is re-run from scratch against fresh state.

use crate::error::StoreError;
use crate::kv::{Kv, KvOp, VersionGuard};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by transaction bodies.
///
/// Returns a boxed future so bodies can borrow the transaction across
/// awaits (the same shape the shell executor uses for async recursion).
pub type TxnFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

/// Upper bound on commit attempts before giving up.
///
/// Conflicts resolve in one or two retries in practice; hitting this cap
/// means the store is livelocked and surfacing an error beats spinning.
pub const MAX_TXN_ATTEMPTS: u32 = 64;

/// Outcome of a committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnResponse {
    /// Store revision at which the transaction committed.
    pub revision: u64,
}

/// A single transaction attempt's view of the store.
pub struct Txn {
    kv: Arc<dyn Kv>,
    reads: HashMap<String, u64>,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl Txn {
    fn new(kv: Arc<dyn Kv>) -> Self {
        Self {
            kv,
            reads: HashMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Read a key, observing our own buffered writes first.
    pub async fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        if let Some(buffered) = self.writes.get(key) {
            return buffered.clone();
        }
        match self.kv.get(key).await {
            Some(versioned) => {
                self.reads.entry(key.to_string()).or_insert(versioned.version);
                Some(versioned.value)
            }
            None => {
                self.reads.entry(key.to_string()).or_insert(0);
                None
            }
        }
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.writes.insert(key.into(), Some(value));
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.writes.insert(key.into(), None);
    }

    /// List entries under `prefix`, merged with buffered writes.
    pub async fn list(&mut self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        let mut merged: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for (key, versioned) in self.kv.list(prefix).await {
            self.reads.entry(key.clone()).or_insert(versioned.version);
            merged.insert(key, versioned.value);
        }
        for (key, write) in self.writes.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match write {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }

    async fn try_commit(self) -> Option<TxnResponse> {
        let guards: Vec<VersionGuard> = self
            .reads
            .iter()
            .map(|(key, version)| VersionGuard {
                key: key.clone(),
                version: *version,
            })
            .collect();
        let ops: Vec<KvOp> = self
            .writes
            .into_iter()
            .map(|(key, write)| match write {
                Some(value) => KvOp::Put { key, value },
                None => KvOp::Delete { key },
            })
            .collect();
        self.kv
            .commit(&guards, &ops)
            .await
            .map(|revision| TxnResponse { revision })
    }
}

/// Run `body` inside an optimistic transaction, retrying on conflict.
///
/// The body must be idempotent with respect to its reads and must not
/// perform external side effects: on a commit conflict it is re-run from
/// scratch against a fresh view.
pub async fn run_in_txn<F>(kv: Arc<dyn Kv>, mut body: F) -> Result<TxnResponse, StoreError>
where
    F: for<'a> FnMut(&'a mut Txn) -> TxnFuture<'a>,
{
    for attempt in 1..=MAX_TXN_ATTEMPTS {
        let mut txn = Txn::new(Arc::clone(&kv));
        body(&mut txn).await?;
        if let Some(response) = txn.try_commit().await {
            return Ok(response);
        }
        tracing::debug!(attempt, "transaction conflict, retrying");
        tokio::task::yield_now().await;
    }
    Err(StoreError::TooManyConflicts {
        attempts: MAX_TXN_ATTEMPTS,
    })
}

#[cfg(test)]
#[path = "txn_tests.rs"]
mod tests;
