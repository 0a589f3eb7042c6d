// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Input staging: pulling datum files into scratch and linking them into
//! the user-visible input directory.
//!
//! The [`Puller`] fetches files from the object store with a bounded
//! number of concurrent downloads. Lazy inputs are materialised as FIFOs
//! fed on first read; `cleanup` drains whatever is still outstanding and
//! must run before the scratch tree is removed so no pipe is opened
//! against a deleted path.

use crate::error::DriverError;
use crate::object::{FileInfo, ObjectStore};
use crate::SCRATCH_SPACE;
use parking_lot::Mutex;
use sluice_core::hashtree::OrderedTree;
use sluice_core::input::{FileRef, Input};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Concurrency-bounded fetcher over the object store.
pub struct Puller {
    store: Arc<dyn ObjectStore>,
    permits: Arc<Semaphore>,
    lazy_tasks: Mutex<Vec<JoinHandle<()>>>,
    fifos: Mutex<Vec<PathBuf>>,
    pulled_bytes: Arc<AtomicU64>,
    lazy_error: Arc<Mutex<Option<DriverError>>>,
    cancel: CancellationToken,
    cleaned: tokio::sync::Mutex<Option<u64>>,
}

impl Puller {
    pub fn new(store: Arc<dyn ObjectStore>, concurrency: usize, cancel: CancellationToken) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(concurrency)),
            lazy_tasks: Mutex::new(Vec::new()),
            fifos: Mutex::new(Vec::new()),
            pulled_bytes: Arc::new(AtomicU64::new(0)),
            lazy_error: Arc::new(Mutex::new(None)),
            cancel,
            cleaned: tokio::sync::Mutex::new(None),
        }
    }

    /// Fetch the file (or subtree) at `file` into `dest_root`.
    ///
    /// Eager pulls complete before this returns; lazy pulls leave a FIFO
    /// behind and stream on first open. Download metadata is mirrored into
    /// the stats tree under `stats_root` when one is given.
    pub async fn pull(
        &self,
        dest_root: &Path,
        file: &FileRef,
        lazy: bool,
        empty_files: bool,
        mut stats_tree: Option<&mut OrderedTree>,
        stats_root: &str,
    ) -> Result<(), DriverError> {
        let root = normalize(&file.path);
        let listed = self
            .store
            .list_files(&file.repo, &file.commit, &root)
            .await?;

        let mut eager: Vec<JoinHandle<Result<(), DriverError>>> = Vec::new();
        for info in listed {
            let dest = dest_for(dest_root, &root, &info);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if let Some(tree) = stats_tree.as_deref_mut() {
                let sub = info
                    .path
                    .strip_prefix(&root)
                    .unwrap_or("")
                    .trim_start_matches('/');
                let tree_path = if sub.is_empty() {
                    normalize(stats_root)
                } else {
                    format!("{}/{sub}", normalize(stats_root))
                };
                tree.put_file(&tree_path, info.hash.clone(), info.size, info.block_refs.clone());
            }

            if empty_files {
                tokio::fs::File::create(&dest).await?;
                continue;
            }
            if lazy {
                self.stage_lazy(&dest, file, &info).await?;
                continue;
            }
            eager.push(self.spawn_fetch(dest, file.clone(), info));
        }

        for handle in eager {
            handle
                .await
                .map_err(|e| DriverError::Io(std::io::Error::other(e)))??;
        }
        Ok(())
    }

    fn spawn_fetch(
        &self,
        dest: PathBuf,
        file: FileRef,
        info: FileInfo,
    ) -> JoinHandle<Result<(), DriverError>> {
        let store = Arc::clone(&self.store);
        let permits = Arc::clone(&self.permits);
        let bytes = Arc::clone(&self.pulled_bytes);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| DriverError::Cancelled)?;
            let data = tokio::select! {
                result = store.get_file(&file.repo, &file.commit, &info.path) => result?,
                () = cancel.cancelled() => return Err(DriverError::Cancelled),
            };
            tokio::fs::write(&dest, &data).await?;
            bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
            Ok(())
        })
    }

    async fn stage_lazy(
        &self,
        dest: &Path,
        file: &FileRef,
        info: &FileInfo,
    ) -> Result<(), DriverError> {
        let fifo = dest.to_path_buf();
        {
            let path = fifo.clone();
            tokio::task::spawn_blocking(move || {
                nix::unistd::mkfifo(&path, nix::sys::stat::Mode::from_bits_truncate(0o666))
            })
            .await
            .map_err(|e| DriverError::Io(std::io::Error::other(e)))?
            .map_err(|e| DriverError::Io(std::io::Error::from(e)))?;
        }
        self.fifos.lock().push(fifo.clone());

        let store = Arc::clone(&self.store);
        let bytes = Arc::clone(&self.pulled_bytes);
        let error_slot = Arc::clone(&self.lazy_error);
        let cancel = self.cancel.clone();
        let file = file.clone();
        let path = info.path.clone();
        // Racing against the cancel token keeps cleanup from waiting on a
        // feeder whose reader never shows up.
        let handle = tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = feed_fifo(store, bytes, error_slot, file, path, fifo) => {}
            }
        });
        self.lazy_tasks.lock().push(handle);
        Ok(())
    }

    /// Drain outstanding lazy pulls, remove their FIFOs, and return the
    /// cumulative pulled byte count.
    ///
    /// Idempotent: the first call does the work and memoises the total;
    /// later calls return the same total and never error. A lazy pull that
    /// failed mid-stream surfaces its error from the first call only.
    pub async fn cleanup(&self) -> Result<u64, DriverError> {
        let mut cleaned = self.cleaned.lock().await;
        if let Some(total) = *cleaned {
            return Ok(total);
        }
        self.cancel.cancel();

        let fifos: Vec<PathBuf> = self.fifos.lock().drain(..).collect();
        // Hold non-blocking read ends open until the FIFOs are removed, so
        // any write-open still blocked in the background gets unstuck
        // instead of waiting on a path nothing will ever read again.
        let mut read_ends = Vec::new();
        for fifo in &fifos {
            if let Ok(end) = open_read_nonblocking(fifo) {
                read_ends.push(end);
            }
        }
        let tasks: Vec<JoinHandle<()>> = self.lazy_tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        for fifo in &fifos {
            let _ = tokio::fs::remove_file(fifo).await;
        }
        drop(read_ends);

        let total = self.pulled_bytes.load(Ordering::Relaxed);
        *cleaned = Some(total);
        if let Some(err) = self.lazy_error.lock().take() {
            return Err(err);
        }
        Ok(total)
    }
}

/// Wait for a reader on the pipe, then stream the file into it.
async fn feed_fifo(
    store: Arc<dyn ObjectStore>,
    bytes: Arc<AtomicU64>,
    error_slot: Arc<Mutex<Option<DriverError>>>,
    file: FileRef,
    path: String,
    fifo: PathBuf,
) {
    let opened = tokio::fs::OpenOptions::new().write(true).open(&fifo).await;
    let mut pipe = match opened {
        Ok(pipe) => pipe,
        Err(_) => return,
    };
    let pulled: Result<u64, DriverError> = async {
        let data = store.get_file(&file.repo, &file.commit, &path).await?;
        pipe.write_all(&data).await?;
        pipe.flush().await?;
        Ok(data.len() as u64)
    }
    .await;
    match pulled {
        Ok(n) => {
            bytes.fetch_add(n, Ordering::Relaxed);
        }
        // The reader went away without draining the pipe; not an error.
        Err(DriverError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Err(e) => {
            error_slot.lock().get_or_insert(e);
        }
    }
}

fn open_read_nonblocking(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(nix::fcntl::OFlag::O_NONBLOCK.bits())
        .open(path)
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}

/// On-disk destination for one listed file relative to the pull root.
fn dest_for(dest_root: &Path, root: &str, info: &FileInfo) -> PathBuf {
    if info.path == root {
        return dest_root.to_path_buf();
    }
    let sub = info
        .path
        .strip_prefix(root)
        .unwrap_or(&info.path)
        .trim_start_matches('/');
    dest_root.join(sub)
}

/// Symlink each staged input, and `out`, into the input directory.
pub(crate) async fn link_data(
    input_dir: &Path,
    inputs: &[Input],
    scratch: &Path,
) -> Result<(), DriverError> {
    for input in inputs {
        tokio::fs::symlink(scratch.join(&input.name), input_dir.join(&input.name)).await?;
    }
    tokio::fs::symlink(scratch.join("out"), input_dir.join("out")).await?;
    Ok(())
}

/// Remove every entry of the input directory except the scratch space.
///
/// This reads the directory rather than the staged input list, so it also
/// clears residue a crashed previous datum may have left behind.
pub(crate) async fn unlink_data(input_dir: &Path) -> Result<(), DriverError> {
    let mut entries = tokio::fs::read_dir(input_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == SCRATCH_SPACE {
            continue;
        }
        let path = entry.path();
        let meta = tokio::fs::symlink_metadata(&path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
