// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed collections over key namespaces.
//!
//! A [`Collection`] is a cheap handle binding a key prefix to a serde
//! value type; [`ReadWriteView`] binds it to one transaction. Per-job
//! collections (chunks, merges) are produced fresh per job id so a whole
//! job's entries can be removed by prefix.

use crate::error::StoreError;
use crate::kv::Kv;
use crate::txn::Txn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

pub struct Collection<V> {
    kv: Arc<dyn Kv>,
    prefix: String,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for Collection<V> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            prefix: self.prefix.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V: Serialize + DeserializeOwned> Collection<V> {
    pub fn new(kv: Arc<dyn Kv>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
            _marker: PhantomData,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn kv(&self) -> Arc<dyn Kv> {
        Arc::clone(&self.kv)
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }

    /// Bind this collection to a transaction.
    pub fn read_write<'a>(&'a self, txn: &'a mut Txn) -> ReadWriteView<'a, V> {
        ReadWriteView {
            collection: self,
            txn,
        }
    }
}

/// A collection's operations inside one transaction.
pub struct ReadWriteView<'a, V> {
    collection: &'a Collection<V>,
    txn: &'a mut Txn,
}

impl<V: Serialize + DeserializeOwned> ReadWriteView<'_, V> {
    pub async fn get(&mut self, key: &str) -> Result<V, StoreError> {
        self.try_get(key).await?.ok_or_else(|| StoreError::NotFound {
            key: self.collection.key_for(key),
        })
    }

    pub async fn try_get(&mut self, key: &str) -> Result<Option<V>, StoreError> {
        match self.txn.get(&self.collection.key_for(key)).await {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put(&mut self, key: &str, value: &V) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value)?;
        self.txn.put(self.collection.key_for(key), bytes);
        Ok(())
    }

    /// Read-modify-write an existing entry; `NotFound` if absent.
    pub async fn update(
        &mut self,
        key: &str,
        mutate: impl FnOnce(&mut V),
    ) -> Result<(), StoreError> {
        let mut value = self.get(key).await?;
        mutate(&mut value);
        self.put(key, &value)
    }

    /// Read-modify-write, creating the entry from `default` when absent.
    pub async fn upsert(
        &mut self,
        key: &str,
        default: impl FnOnce() -> V,
        mutate: impl FnOnce(&mut V),
    ) -> Result<(), StoreError> {
        let mut value = self.try_get(key).await?.unwrap_or_else(default);
        mutate(&mut value);
        self.put(key, &value)
    }

    pub fn delete(&mut self, key: &str) {
        self.txn.delete(self.collection.key_for(key));
    }

    /// Delete every entry in the collection.
    pub async fn delete_all(&mut self) {
        let prefix = format!("{}/", self.collection.prefix);
        for (key, _) in self.txn.list(&prefix).await {
            self.txn.delete(key);
        }
    }

    /// All entries in key order, with the prefix stripped.
    pub async fn list(&mut self) -> Result<Vec<(String, V)>, StoreError> {
        let prefix = format!("{}/", self.collection.prefix);
        let mut entries = Vec::new();
        for (key, bytes) in self.txn.list(&prefix).await {
            let short = key.strip_prefix(&prefix).unwrap_or(&key).to_string();
            entries.push((short, serde_json::from_slice(&bytes)?));
        }
        Ok(entries)
    }

    pub async fn count(&mut self) -> usize {
        let prefix = format!("{}/", self.collection.prefix);
        self.txn.list(&prefix).await.len()
    }
}

#[cfg(test)]
#[path = "collection_tests.rs"]
mod tests;
