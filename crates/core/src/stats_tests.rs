// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;

#[test]
fn byte_counters_accumulate() {
    let stats = ProcessStats::default();
    stats.add_download_bytes(10);
    stats.add_download_bytes(5);
    stats.add_upload_bytes(7);
    assert_eq!(stats.download_bytes(), 15);
    assert_eq!(stats.upload_bytes(), 7);
}

#[test]
fn byte_counters_accumulate_across_threads() {
    let stats = Arc::new(ProcessStats::default());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let stats = Arc::clone(&stats);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    stats.add_upload_bytes(1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(stats.upload_bytes(), 8000);
}

#[test]
fn durations_round_trip_through_millis() {
    let stats = ProcessStats::default();
    stats.set_process_time(Duration::from_millis(1250));
    assert_eq!(stats.process_time(), Duration::from_millis(1250));
    assert_eq!(stats.download_time(), Duration::ZERO);
}

#[test]
fn snapshot_copies_all_fields() {
    let stats = ProcessStats::default();
    stats.add_download_bytes(3);
    stats.add_upload_bytes(4);
    stats.set_download_time(Duration::from_millis(100));
    stats.set_process_time(Duration::from_millis(200));
    stats.set_upload_time(Duration::from_millis(300));

    let snap = stats.snapshot();
    assert_eq!(snap.download_bytes, 3);
    assert_eq!(snap.upload_bytes, 4);
    assert_eq!(snap.download_time_ms, 100);
    assert_eq!(snap.process_time_ms, 200);
    assert_eq!(snap.upload_time_ms, 300);
}
