// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uploading the output directory as a tagged hash-tree.
//!
//! All regular-file bytes of one datum stream into a single fresh block;
//! each file becomes a tree node referencing one contiguous range of that
//! block. Output symlinks that point back into staged input data are
//! folded in by inheriting the input's existing block refs instead of
//! re-uploading bytes.

use crate::error::DriverError;
use crate::object::{BlockWriter, ObjectStore};
use sha2::{Digest, Sha256};
use sluice_core::hashtree::{BlockRef, OrderedTree};
use sluice_core::input::Input;
use sluice_core::opaque_id;
use sluice_core::stats::ProcessStats;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

const UPLOAD_BUF_SIZE: usize = 64 * 1024;

/// Rebase an output symlink's target to an input-dir-relative path.
///
/// When the target begins with the link's own output-relative path, rebase
/// from that; otherwise rebase from the input directory. Returns `None`
/// when the target is under neither.
pub fn rebase_link_target(target: &Path, input_dir: &Path, link_rel: &Path) -> Option<PathBuf> {
    if let Ok(stripped) = target.strip_prefix(link_rel) {
        return Some(stripped.to_path_buf());
    }
    target.strip_prefix(input_dir).ok().map(Path::to_path_buf)
}

/// Walk `<input_dir>/out`, stream it into the object store, and write the
/// resulting tree as a separate object under `tag`. Returns the
/// serialized tree bytes.
pub(crate) async fn upload_output(
    store: &Arc<dyn ObjectStore>,
    input_dir: &Path,
    tag: &str,
    inputs: &[Input],
    stats: &ProcessStats,
    stats_tree: Option<&mut OrderedTree>,
) -> Result<Vec<u8>, DriverError> {
    let mut writer = store.put_objects().await?;
    let block = opaque_id();
    writer.start_block(&block).await?;

    let mut uploader = Uploader {
        store,
        input_dir,
        out_dir: input_dir.join("out"),
        inputs,
        stats,
        writer,
        block,
        tree: OrderedTree::new(),
        stats_tree,
        offset: 0,
        buf: vec![0u8; UPLOAD_BUF_SIZE],
    };

    let walked = uploader.walk().await;
    let Uploader { writer, tree, .. } = uploader;
    if let Err(e) = walked {
        // Best-effort close after a failed walk.
        let _ = writer.close().await;
        return Err(e);
    }
    writer.close().await?;

    let bytes = tree.serialize().map_err(DriverError::TreeSerialize)?;
    store.put_tagged_object(&[tag.to_string()], &bytes).await?;
    Ok(bytes)
}

struct Uploader<'a> {
    store: &'a Arc<dyn ObjectStore>,
    input_dir: &'a Path,
    out_dir: PathBuf,
    inputs: &'a [Input],
    stats: &'a ProcessStats,
    writer: Box<dyn BlockWriter>,
    block: String,
    tree: OrderedTree,
    stats_tree: Option<&'a mut OrderedTree>,
    offset: u64,
    buf: Vec<u8>,
}

impl Uploader<'_> {
    async fn walk(&mut self) -> Result<(), DriverError> {
        let out_dir = self.out_dir.clone();
        for entry in WalkDir::new(&out_dir).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| DriverError::Io(std::io::Error::other(e)))?;
            let path = entry.path();
            if path == out_dir {
                continue;
            }
            if path.to_str().is_none() {
                return Err(DriverError::InvalidUtf8Path {
                    path: path.to_string_lossy().into_owned(),
                });
            }
            let rel = path
                .strip_prefix(&out_dir)
                .map_err(|e| DriverError::Io(std::io::Error::other(e)))?
                .to_path_buf();
            let rel_str = rel.to_string_lossy().into_owned();

            let file_type = entry.file_type();
            if file_type.is_dir() {
                self.put_dir(&rel_str);
                continue;
            }
            // User code occasionally copies staged pipes into the output;
            // reading one would block the upload forever.
            if file_type.is_fifo() {
                return Err(DriverError::SpecialFile { path: rel_str });
            }
            if file_type.is_symlink() {
                self.upload_symlink(path, &rel, &rel_str).await?;
                continue;
            }
            self.upload_file(path, &rel_str).await?;
        }
        Ok(())
    }

    fn put_dir(&mut self, tree_path: &str) {
        self.tree.put_dir(tree_path);
        if let Some(stats_tree) = self.stats_tree.as_deref_mut() {
            stats_tree.put_dir(tree_path);
        }
    }

    fn put_file(&mut self, tree_path: &str, hash: String, size: u64, refs: Vec<BlockRef>) {
        self.tree.put_file(tree_path, hash.clone(), size, refs.clone());
        if let Some(stats_tree) = self.stats_tree.as_deref_mut() {
            stats_tree.put_file(tree_path, hash, size, refs);
        }
    }

    /// A symlink in the output: fold it in when it points at staged input
    /// data, otherwise upload whatever it dereferences to.
    async fn upload_symlink(
        &mut self,
        link_path: &Path,
        link_rel: &Path,
        rel_str: &str,
    ) -> Result<(), DriverError> {
        let target = tokio::fs::read_link(link_path).await?;
        if target.starts_with(self.input_dir) {
            if let Some(rebased) = rebase_link_target(&target, self.input_dir, link_rel) {
                let input_name = rebased
                    .components()
                    .next()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .unwrap_or_default();
                if let Some(input) = self.inputs.iter().find(|i| i.name == input_name) {
                    let input = input.clone();
                    return self.fold_in(&input, &rebased, rel_str).await;
                }
            }
        }
        // Opaque link: read through it like a regular file.
        self.upload_file(link_path, rel_str).await
    }

    /// Attach the target's existing block refs without re-uploading.
    /// Linked directories are folded in recursively.
    async fn fold_in(
        &mut self,
        input: &Input,
        rebased: &Path,
        tree_root: &str,
    ) -> Result<(), DriverError> {
        let disk_root = self.input_dir.join(rebased);
        let pfs_root = pfs_path_of(rebased);

        let meta = tokio::fs::metadata(&disk_root).await?;
        if !meta.is_dir() {
            return self.attach_input_file(input, tree_root, &pfs_root).await;
        }

        let walk_root = disk_root.clone();
        let mut found: Vec<(PathBuf, bool)> = Vec::new();
        for entry in WalkDir::new(&walk_root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| DriverError::Io(std::io::Error::other(e)))?;
            let sub = entry
                .path()
                .strip_prefix(&walk_root)
                .map_err(|e| DriverError::Io(std::io::Error::other(e)))?;
            found.push((sub.to_path_buf(), entry.file_type().is_dir()));
        }
        for (sub, is_dir) in found {
            let tree_path = if sub.as_os_str().is_empty() {
                tree_root.to_string()
            } else {
                format!("{tree_root}/{}", sub.to_string_lossy())
            };
            if is_dir {
                self.put_dir(&tree_path);
            } else {
                let pfs_path = if sub.as_os_str().is_empty() {
                    pfs_root.clone()
                } else {
                    format!("{}/{}", pfs_root.trim_end_matches('/'), sub.to_string_lossy())
                };
                self.attach_input_file(input, &tree_path, &pfs_path).await?;
            }
        }
        Ok(())
    }

    async fn attach_input_file(
        &mut self,
        input: &Input,
        tree_path: &str,
        pfs_path: &str,
    ) -> Result<(), DriverError> {
        let info = self
            .store
            .inspect_file(&input.file.repo, &input.file.commit, pfs_path)
            .await?;
        // Inline object refs resolve first, then the file's own refs.
        let mut refs = Vec::new();
        for hash in &info.object_hashes {
            refs.push(self.store.inspect_object(hash).await?.block_ref);
        }
        refs.extend(info.block_refs.iter().cloned());
        self.put_file(tree_path, info.hash, info.size, refs);
        Ok(())
    }

    /// Stream a regular file (or a dereferenced opaque link) into the
    /// block and record its node.
    async fn upload_file(&mut self, disk_path: &Path, tree_path: &str) -> Result<(), DriverError> {
        let mut file = tokio::fs::File::open(disk_path).await?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        loop {
            let n = file.read(&mut self.buf).await?;
            if n == 0 {
                break;
            }
            self.writer.append(&self.buf[..n]).await?;
            hasher.update(&self.buf[..n]);
            size += n as u64;
        }
        let hash = format!("{:x}", hasher.finalize());
        let refs = vec![BlockRef::new(
            self.block.clone(),
            self.offset,
            self.offset + size,
        )];
        self.put_file(tree_path, hash, size, refs);
        self.offset += size;
        self.stats.add_upload_bytes(size);
        Ok(())
    }
}

/// The original store path of an input-relative location: strip the input
/// name component and root the remainder.
fn pfs_path_of(rebased: &Path) -> String {
    let mut components = rebased.components();
    components.next();
    let rest = components.as_path().to_string_lossy();
    format!("/{}", rest.trim_start_matches('/'))
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
