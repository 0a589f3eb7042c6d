// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use metrics::{Counter, CounterFn, Gauge, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Captures every counter increment and histogram record by key name.
#[derive(Clone, Default)]
struct CapturingRecorder {
    counters: Arc<Mutex<HashMap<String, u64>>>,
    histograms: Arc<Mutex<HashMap<String, Vec<f64>>>>,
}

impl CapturingRecorder {
    fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    fn histogram_len(&self, name: &str) -> usize {
        self.histograms.lock().get(name).map(Vec::len).unwrap_or(0)
    }

    fn touched(&self) -> usize {
        self.counters.lock().len() + self.histograms.lock().len()
    }
}

struct CapturedCounter {
    name: String,
    counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl CounterFn for CapturedCounter {
    fn increment(&self, value: u64) {
        *self.counters.lock().entry(self.name.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        self.counters.lock().insert(self.name.clone(), value);
    }
}

struct CapturedHistogram {
    name: String,
    histograms: Arc<Mutex<HashMap<String, Vec<f64>>>>,
}

impl HistogramFn for CapturedHistogram {
    fn record(&self, value: f64) {
        self.histograms
            .lock()
            .entry(self.name.clone())
            .or_default()
            .push(value);
    }
}

impl Recorder for CapturingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CapturedCounter {
            name: key.name().to_string(),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(CapturedHistogram {
            name: key.name().to_string(),
            histograms: Arc::clone(&self.histograms),
        }))
    }
}

fn logger() -> DatumLogger {
    DatumLogger::new("edges", "job-1").with_datum("datum-1")
}

/// Replays one successful datum through every reporter.
fn replay_datum(reporter: &StatsReporter) {
    let stats = ProcessStats::default();
    let logger = logger();
    let started = Instant::now() - Duration::from_millis(5);
    reporter.user_code_started(&logger);
    reporter.user_code_finished(false, started, &stats, &logger);
    reporter.report_download_time(started, &stats, &logger);
    reporter.report_download_size(128, &logger);
    stats.add_upload_bytes(256);
    reporter.report_upload(started, &stats, &logger);
}

#[test]
fn tollgate_off_emits_nothing() {
    let recorder = CapturingRecorder::default();
    let reporter = StatsReporter::new(false, "pipeline-1");
    metrics::with_local_recorder(&recorder, || replay_datum(&reporter));
    assert_eq!(recorder.touched(), 0);
}

#[test]
fn tollgate_off_still_stamps_durations() {
    let reporter = StatsReporter::new(false, "pipeline-1");
    let stats = ProcessStats::default();
    let started = Instant::now() - Duration::from_millis(50);
    reporter.user_code_finished(false, started, &stats, &logger());
    assert!(stats.process_time() >= Duration::from_millis(50));
}

#[test]
fn tollgate_on_touches_each_metric_once_per_datum() {
    let recorder = CapturingRecorder::default();
    let reporter = StatsReporter::new(true, "pipeline-1");
    metrics::with_local_recorder(&recorder, || replay_datum(&reporter));

    // Datum count: started + finished.
    assert_eq!(recorder.counter("sluice_datum_count"), 2);

    for histogram in [
        "sluice_datum_proc_time_seconds",
        "sluice_datum_upload_time_seconds",
        "sluice_datum_download_time_seconds",
        "sluice_datum_upload_size_bytes",
        "sluice_datum_download_size_bytes",
    ] {
        assert_eq!(recorder.histogram_len(histogram), 1, "{histogram}");
    }

    assert_eq!(recorder.counter("sluice_datum_upload_bytes_total"), 256);
    assert_eq!(recorder.counter("sluice_datum_download_bytes_total"), 128);
    assert!(recorder.counter("sluice_datum_proc_time_ms_total") >= 5);
}

#[test]
fn errored_datum_counts_as_errored() {
    let recorder = CapturingRecorder::default();
    let reporter = StatsReporter::new(true, "pipeline-1");
    let stats = ProcessStats::default();
    metrics::with_local_recorder(&recorder, || {
        reporter.user_code_finished(true, Instant::now(), &stats, &logger());
    });
    // One finished-or-errored increment either way; the label carries the
    // outcome, the name is shared.
    assert_eq!(recorder.counter("sluice_datum_count"), 1);
}

#[tokio::test]
async fn entitlement_probes() {
    assert!(!NoEntitlement.active().await.unwrap());
    assert!(StaticEntitlement(true).active().await.unwrap());
    assert!(!StaticEntitlement(false).active().await.unwrap());
}
