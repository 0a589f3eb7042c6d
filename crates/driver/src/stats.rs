// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The stats tollgate: datum metrics, exported only when the enterprise
//! entitlement probe came back active.
//!
//! Reporters always stamp the corresponding [`ProcessStats`] duration;
//! metric emission is gated and can never fail execution.

use crate::error::DriverError;
use crate::logger::DatumLogger;
use async_trait::async_trait;
use metrics::{counter, histogram};
use sluice_core::stats::ProcessStats;
use std::time::Instant;

/// The enterprise-activation probe, checked once at driver construction.
#[async_trait]
pub trait Entitlement: Send + Sync {
    async fn active(&self) -> Result<bool, DriverError>;
}

/// No entitlement service configured: stats stay off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEntitlement;

#[async_trait]
impl Entitlement for NoEntitlement {
    async fn active(&self) -> Result<bool, DriverError> {
        Ok(false)
    }
}

/// A fixed probe result, for tests and embedded setups.
#[derive(Debug, Clone, Copy)]
pub struct StaticEntitlement(pub bool);

#[async_trait]
impl Entitlement for StaticEntitlement {
    async fn active(&self) -> Result<bool, DriverError> {
        Ok(self.0)
    }
}

/// Emits datum counters and histograms labelled by pipeline and job.
#[derive(Debug, Clone)]
pub(crate) struct StatsReporter {
    enabled: bool,
    pipeline_id: String,
}

impl StatsReporter {
    pub(crate) fn new(enabled: bool, pipeline_id: impl Into<String>) -> Self {
        Self {
            enabled,
            pipeline_id: pipeline_id.into(),
        }
    }

    pub(crate) fn user_code_started(&self, logger: &DatumLogger) {
        if !self.enabled {
            return;
        }
        counter!(
            "sluice_datum_count",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string(),
            "state" => "started"
        )
        .increment(1);
    }

    pub(crate) fn user_code_finished(
        &self,
        errored: bool,
        started: Instant,
        stats: &ProcessStats,
        logger: &DatumLogger,
    ) {
        let elapsed = started.elapsed();
        stats.set_process_time(elapsed);
        if !self.enabled {
            return;
        }
        let state = if errored { "errored" } else { "finished" };
        counter!(
            "sluice_datum_count",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string(),
            "state" => state
        )
        .increment(1);
        histogram!(
            "sluice_datum_proc_time_seconds",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string(),
            "state" => state
        )
        .record(elapsed.as_secs_f64());
        counter!(
            "sluice_datum_proc_time_ms_total",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string()
        )
        .increment(elapsed.as_millis() as u64);
    }

    pub(crate) fn report_upload(
        &self,
        started: Instant,
        stats: &ProcessStats,
        logger: &DatumLogger,
    ) {
        let elapsed = started.elapsed();
        stats.set_upload_time(elapsed);
        if !self.enabled {
            return;
        }
        histogram!(
            "sluice_datum_upload_time_seconds",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string()
        )
        .record(elapsed.as_secs_f64());
        counter!(
            "sluice_datum_upload_time_ms_total",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string()
        )
        .increment(elapsed.as_millis() as u64);
        histogram!(
            "sluice_datum_upload_size_bytes",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string()
        )
        .record(stats.upload_bytes() as f64);
        counter!(
            "sluice_datum_upload_bytes_total",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string()
        )
        .increment(stats.upload_bytes());
    }

    pub(crate) fn report_download_time(
        &self,
        started: Instant,
        stats: &ProcessStats,
        logger: &DatumLogger,
    ) {
        let elapsed = started.elapsed();
        stats.set_download_time(elapsed);
        if !self.enabled {
            return;
        }
        histogram!(
            "sluice_datum_download_time_seconds",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string()
        )
        .record(elapsed.as_secs_f64());
        counter!(
            "sluice_datum_download_time_ms_total",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string()
        )
        .increment(elapsed.as_millis() as u64);
    }

    pub(crate) fn report_download_size(&self, bytes: u64, logger: &DatumLogger) {
        if !self.enabled {
            return;
        }
        histogram!(
            "sluice_datum_download_size_bytes",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string()
        )
        .record(bytes as f64);
        counter!(
            "sluice_datum_download_bytes_total",
            "pipeline" => self.pipeline_id.clone(),
            "job" => logger.job_id().to_string()
        )
        .increment(bytes);
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
