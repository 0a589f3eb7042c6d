// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path-keyed ordered hash-tree manifest.
//!
//! A tree records every path a datum produced: directory nodes and file
//! nodes carrying a content hash, size, and the block ranges holding the
//! bytes. The map is ordered so serialization is deterministic and two
//! trees built from the same walk are byte-identical.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Half-open byte range `[lower, upper)` within a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub lower: u64,
    pub upper: u64,
}

/// A slice of a content-addressed block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub block: String,
    pub range: ByteRange,
}

impl BlockRef {
    pub fn new(block: impl Into<String>, lower: u64, upper: u64) -> Self {
        Self {
            block: block.into(),
            range: ByteRange { lower, upper },
        }
    }
}

/// A file entry: content hash, size, and where the bytes live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Lowercase hex SHA-256 of the full file contents.
    pub hash: String,
    pub size: u64,
    pub block_refs: Vec<BlockRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Dir,
    File(FileNode),
}

/// An ordered tree rooted at `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedTree {
    nodes: BTreeMap<String, Node>,
}

impl Default for OrderedTree {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedTree {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Self { nodes }
    }

    /// Normalize a path to its canonical `/`-rooted form.
    fn normalize(path: &str) -> String {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() || trimmed == "." {
            return "/".to_string();
        }
        format!("/{trimmed}")
    }

    /// Insert a directory node, creating missing parents.
    ///
    /// Empty directories are kept; they may be meaningful to consumers.
    pub fn put_dir(&mut self, path: &str) {
        let key = Self::normalize(path);
        self.ensure_parents(&key);
        self.nodes.insert(key, Node::Dir);
    }

    /// Insert directory nodes for `path` and every ancestor.
    pub fn mkdir_all(&mut self, path: &str) {
        self.put_dir(path);
    }

    /// Insert a file node, creating missing parent directories.
    ///
    /// Last write wins: a file put over an existing directory node (or the
    /// reverse) replaces it.
    pub fn put_file(&mut self, path: &str, hash: impl Into<String>, size: u64, block_refs: Vec<BlockRef>) {
        let key = Self::normalize(path);
        self.ensure_parents(&key);
        self.nodes.insert(
            key,
            Node::File(FileNode {
                hash: hash.into(),
                size,
                block_refs,
            }),
        );
    }

    fn ensure_parents(&mut self, key: &str) {
        let mut end = key.len();
        while let Some(idx) = key[..end].rfind('/') {
            if idx == 0 {
                break;
            }
            let parent = &key[..idx];
            if self.nodes.contains_key(parent) {
                break;
            }
            self.nodes.insert(parent.to_string(), Node::Dir);
            end = idx;
        }
    }

    pub fn get(&self, path: &str) -> Option<&Node> {
        self.nodes.get(&Self::normalize(path))
    }

    /// The file node at `path`, if the path holds a file.
    pub fn file(&self, path: &str) -> Option<&FileNode> {
        match self.get(path) {
            Some(Node::File(node)) => Some(node),
            _ => None,
        }
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root is always present; a tree with only the root is "empty".
        self.nodes.len() <= 1
    }

    /// All paths in lexical order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Canonical serialized form.
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
#[path = "hashtree_tests.rs"]
mod tests;
