// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-datum scratch directories.
//!
//! Downloaded inputs and the output root live under
//! `<input_dir>/.scratch/<opaque-id>/`, then get symlinked into the
//! user-visible input directory. A scratch path is owned by exactly one
//! datum execution and is removed on every exit path.

use crate::error::DriverError;
use crate::SCRATCH_SPACE;
use sluice_core::opaque_id;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Allocate a fresh scratch directory with an `out` child.
///
/// For spout pipelines `out` is a FIFO the user code writes into; for
/// everything else it is the output directory. Spout scratch spaces are
/// mode 0700, normal ones 0777 so an arbitrary uid can write outputs.
pub async fn allocate(input_dir: &Path, spout: bool) -> Result<PathBuf, DriverError> {
    let scratch = input_dir.join(SCRATCH_SPACE).join(opaque_id());
    let out = scratch.join("out");
    let mode = if spout { 0o700 } else { 0o777 };

    tokio::fs::create_dir_all(&scratch).await?;
    tokio::fs::set_permissions(&scratch, std::fs::Permissions::from_mode(mode)).await?;

    if spout {
        let fifo = out.clone();
        tokio::task::spawn_blocking(move || {
            nix::unistd::mkfifo(&fifo, nix::sys::stat::Mode::from_bits_truncate(0o666))
        })
        .await
        .map_err(|e| DriverError::Io(std::io::Error::other(e)))?
        .map_err(|e| DriverError::Io(std::io::Error::from(e)))?;
    } else {
        tokio::fs::create_dir_all(&out).await?;
        tokio::fs::set_permissions(&out, std::fs::Permissions::from_mode(0o777)).await?;
    }
    Ok(scratch)
}

/// Remove a scratch directory recursively. Idempotent: an already-absent
/// path is success.
pub async fn teardown(scratch: &Path) -> Result<(), DriverError> {
    match tokio::fs::remove_dir_all(scratch).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "scratch_tests.rs"]
mod tests;
