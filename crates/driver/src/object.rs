// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The object-store client surface the driver consumes.
//!
//! The real service lives elsewhere; the driver only needs streaming block
//! writes, tagged object writes, and file/object inspection for the
//! symlink fold-in path. [`MemObjectStore`] is the in-process stand-in
//! used by the mock layer and tests.

use crate::error::DriverError;
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use sluice_core::hashtree::BlockRef;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Metadata for a file in the content-addressed store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub path: String,
    /// Lowercase hex SHA-256 of the file contents.
    pub hash: String,
    pub size: u64,
    /// Inline object hashes; resolved to block refs via `inspect_object`.
    pub object_hashes: Vec<String>,
    pub block_refs: Vec<BlockRef>,
}

/// Metadata for a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    pub hash: String,
    pub block_ref: BlockRef,
}

/// A streaming put-objects session: one block, appended in order.
#[async_trait]
pub trait BlockWriter: Send {
    async fn start_block(&mut self, block: &str) -> Result<(), DriverError>;

    async fn append(&mut self, bytes: &[u8]) -> Result<(), DriverError>;

    /// Close the session. Implementations tolerate server-side EOF.
    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// The object-store operations the driver consumes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a streaming session for block writes.
    async fn put_objects(&self) -> Result<Box<dyn BlockWriter>, DriverError>;

    /// Write `bytes` as a single object reachable under each tag.
    async fn put_tagged_object(&self, tags: &[String], bytes: &[u8]) -> Result<(), DriverError>;

    async fn inspect_file(
        &self,
        repo: &str,
        commit: &str,
        path: &str,
    ) -> Result<FileInfo, DriverError>;

    async fn inspect_object(&self, hash: &str) -> Result<ObjectInfo, DriverError>;

    async fn get_file(&self, repo: &str, commit: &str, path: &str)
        -> Result<Vec<u8>, DriverError>;

    /// The files at or under `path`, in path order. A path naming a single
    /// file returns exactly that file.
    async fn list_files(
        &self,
        repo: &str,
        commit: &str,
        path: &str,
    ) -> Result<Vec<FileInfo>, DriverError>;
}

#[derive(Debug, Clone)]
struct SeededFile {
    bytes: Vec<u8>,
    info: FileInfo,
}

#[derive(Default)]
struct MemObjectStoreInner {
    blocks: HashMap<String, Vec<u8>>,
    tags: HashMap<String, Vec<u8>>,
    objects: HashMap<String, ObjectInfo>,
    // (repo, commit) -> path -> file
    repos: HashMap<(String, String), BTreeMap<String, SeededFile>>,
}

/// In-memory [`ObjectStore`] recording everything it is sent.
#[derive(Clone, Default)]
pub struct MemObjectStore {
    inner: Arc<Mutex<MemObjectStoreInner>>,
}

impl MemObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a repo file with explicit block refs, as if a previous job
    /// uploaded it. Returns the content hash.
    pub fn seed_repo_file(
        &self,
        repo: &str,
        commit: &str,
        path: &str,
        bytes: &[u8],
        block_refs: Vec<BlockRef>,
    ) -> String {
        self.seed_repo_file_with_objects(repo, commit, path, bytes, Vec::new(), block_refs)
    }

    /// Seed a repo file carrying inline object hashes in addition to its
    /// own block refs.
    pub fn seed_repo_file_with_objects(
        &self,
        repo: &str,
        commit: &str,
        path: &str,
        bytes: &[u8],
        object_hashes: Vec<String>,
        block_refs: Vec<BlockRef>,
    ) -> String {
        let hash = format!("{:x}", Sha256::digest(bytes));
        let info = FileInfo {
            path: normalize_path(path),
            hash: hash.clone(),
            size: bytes.len() as u64,
            object_hashes,
            block_refs,
        };
        let mut inner = self.inner.lock();
        inner
            .repos
            .entry((repo.to_string(), commit.to_string()))
            .or_default()
            .insert(info.path.clone(), SeededFile {
                bytes: bytes.to_vec(),
                info,
            });
        hash
    }

    /// Seed an object whose metadata resolves to `block_ref`.
    pub fn seed_object(&self, hash: &str, block_ref: BlockRef) {
        self.inner.lock().objects.insert(
            hash.to_string(),
            ObjectInfo {
                hash: hash.to_string(),
                block_ref,
            },
        );
    }

    /// Bytes appended to `block` so far, if the block exists.
    pub fn block_bytes(&self, block: &str) -> Option<Vec<u8>> {
        self.inner.lock().blocks.get(block).cloned()
    }

    /// Ids of all blocks opened by put-objects sessions.
    pub fn block_ids(&self) -> Vec<String> {
        self.inner.lock().blocks.keys().cloned().collect()
    }

    /// The object bytes written under `tag`, if any.
    pub fn tagged(&self, tag: &str) -> Option<Vec<u8>> {
        self.inner.lock().tags.get(tag).cloned()
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}

struct MemBlockWriter {
    inner: Arc<Mutex<MemObjectStoreInner>>,
    block: Option<String>,
}

#[async_trait]
impl BlockWriter for MemBlockWriter {
    async fn start_block(&mut self, block: &str) -> Result<(), DriverError> {
        self.inner
            .lock()
            .blocks
            .entry(block.to_string())
            .or_default();
        self.block = Some(block.to_string());
        Ok(())
    }

    async fn append(&mut self, bytes: &[u8]) -> Result<(), DriverError> {
        let block = self
            .block
            .as_ref()
            .ok_or_else(|| DriverError::ObjectStore("append before start_block".into()))?;
        let mut inner = self.inner.lock();
        if let Some(buf) = inner.blocks.get_mut(block) {
            buf.extend_from_slice(bytes);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemObjectStore {
    async fn put_objects(&self) -> Result<Box<dyn BlockWriter>, DriverError> {
        Ok(Box::new(MemBlockWriter {
            inner: Arc::clone(&self.inner),
            block: None,
        }))
    }

    async fn put_tagged_object(&self, tags: &[String], bytes: &[u8]) -> Result<(), DriverError> {
        let mut inner = self.inner.lock();
        for tag in tags {
            inner.tags.insert(tag.clone(), bytes.to_vec());
        }
        Ok(())
    }

    async fn inspect_file(
        &self,
        repo: &str,
        commit: &str,
        path: &str,
    ) -> Result<FileInfo, DriverError> {
        let key = (repo.to_string(), commit.to_string());
        let path = normalize_path(path);
        let inner = self.inner.lock();
        inner
            .repos
            .get(&key)
            .and_then(|files| files.get(&path))
            .map(|file| file.info.clone())
            .ok_or_else(|| {
                DriverError::ObjectStore(format!("file not found: {repo}@{commit}:{path}"))
            })
    }

    async fn inspect_object(&self, hash: &str) -> Result<ObjectInfo, DriverError> {
        self.inner
            .lock()
            .objects
            .get(hash)
            .cloned()
            .ok_or_else(|| DriverError::ObjectStore(format!("object not found: {hash}")))
    }

    async fn get_file(
        &self,
        repo: &str,
        commit: &str,
        path: &str,
    ) -> Result<Vec<u8>, DriverError> {
        let key = (repo.to_string(), commit.to_string());
        let path = normalize_path(path);
        let inner = self.inner.lock();
        inner
            .repos
            .get(&key)
            .and_then(|files| files.get(&path))
            .map(|file| file.bytes.clone())
            .ok_or_else(|| {
                DriverError::ObjectStore(format!("file not found: {repo}@{commit}:{path}"))
            })
    }

    async fn list_files(
        &self,
        repo: &str,
        commit: &str,
        path: &str,
    ) -> Result<Vec<FileInfo>, DriverError> {
        let key = (repo.to_string(), commit.to_string());
        let path = normalize_path(path);
        let inner = self.inner.lock();
        let files = inner.repos.get(&key).ok_or_else(|| {
            DriverError::ObjectStore(format!("repo not found: {repo}@{commit}"))
        })?;
        if let Some(file) = files.get(&path) {
            return Ok(vec![file.info.clone()]);
        }
        let dir_prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let matched: Vec<FileInfo> = files
            .range(dir_prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&dir_prefix))
            .map(|(_, file)| file.info.clone())
            .collect();
        if matched.is_empty() {
            return Err(DriverError::ObjectStore(format!(
                "file not found: {repo}@{commit}:{path}"
            )));
        }
        Ok(matched)
    }
}

#[cfg(test)]
#[path = "object_tests.rs"]
mod tests;
