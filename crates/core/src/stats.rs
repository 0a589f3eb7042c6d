// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-datum process statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Statistics collected while one datum is processed.
///
/// Byte counters are atomic because the puller drains lazy pulls and the
/// uploader streams output from tasks that may run alongside the critical
/// path. Durations are stamped once by the driver as each phase completes.
#[derive(Debug, Default)]
pub struct ProcessStats {
    download_time_ms: AtomicU64,
    process_time_ms: AtomicU64,
    upload_time_ms: AtomicU64,
    download_bytes: AtomicU64,
    upload_bytes: AtomicU64,
}

impl ProcessStats {
    pub fn add_download_bytes(&self, n: u64) {
        self.download_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_upload_bytes(&self, n: u64) {
        self.upload_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn download_bytes(&self) -> u64 {
        self.download_bytes.load(Ordering::Relaxed)
    }

    pub fn upload_bytes(&self) -> u64 {
        self.upload_bytes.load(Ordering::Relaxed)
    }

    pub fn set_download_time(&self, d: Duration) {
        self.download_time_ms.store(d.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set_process_time(&self, d: Duration) {
        self.process_time_ms.store(d.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set_upload_time(&self, d: Duration) {
        self.upload_time_ms.store(d.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn download_time(&self) -> Duration {
        Duration::from_millis(self.download_time_ms.load(Ordering::Relaxed))
    }

    pub fn process_time(&self) -> Duration {
        Duration::from_millis(self.process_time_ms.load(Ordering::Relaxed))
    }

    pub fn upload_time(&self) -> Duration {
        Duration::from_millis(self.upload_time_ms.load(Ordering::Relaxed))
    }

    /// A plain serializable copy, for reporting back to the spawner.
    pub fn snapshot(&self) -> ProcessStatsSnapshot {
        ProcessStatsSnapshot {
            download_time_ms: self.download_time_ms.load(Ordering::Relaxed),
            process_time_ms: self.process_time_ms.load(Ordering::Relaxed),
            upload_time_ms: self.upload_time_ms.load(Ordering::Relaxed),
            download_bytes: self.download_bytes(),
            upload_bytes: self.upload_bytes(),
        }
    }
}

/// Point-in-time copy of [`ProcessStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatsSnapshot {
    pub download_time_ms: u64,
    pub process_time_ms: u64,
    pub upload_time_ms: u64,
    pub download_bytes: u64,
    pub upload_bytes: u64,
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
