// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tagged logging for driver progress and relayed user-code output.
//!
//! Every line carries the pipeline, job, and datum identifiers as tracing
//! fields so a replica's interleaved output stays attributable.

/// A cheap-to-clone logger bound to one pipeline/job/datum.
#[derive(Debug, Clone, Default)]
pub struct DatumLogger {
    pipeline: String,
    job_id: String,
    datum_id: String,
}

impl DatumLogger {
    pub fn new(pipeline: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            job_id: job_id.into(),
            datum_id: String::new(),
        }
    }

    /// A copy of this logger tagged with a datum id.
    pub fn with_datum(&self, datum_id: impl Into<String>) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            job_id: self.job_id.clone(),
            datum_id: datum_id.into(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// A driver progress line.
    pub fn log(&self, message: &str) {
        tracing::info!(
            pipeline = %self.pipeline,
            job = %self.job_id,
            datum = %self.datum_id,
            "{message}"
        );
    }

    /// One line of user-code stdout/stderr.
    pub fn user_line(&self, line: &str) {
        tracing::info!(
            target: "sluice::user_code",
            pipeline = %self.pipeline,
            job = %self.job_id,
            datum = %self.datum_id,
            "{line}"
        );
    }
}
