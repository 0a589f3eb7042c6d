// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A mock driver for tests: heavy I/O is short-circuited, the
//! coordination store stays real.
//!
//! `with_data` invokes its callback with fresh stats and touches no
//! filesystem; the runners are no-ops. Collection and transaction
//! operations go through the provided store, so state-machine and
//! transaction behaviour can be verified against it.

use crate::driver::{Driver, TxnBody, WithDataCallback};
use crate::error::DriverError;
use crate::jobstate;
use crate::logger::DatumLogger;
use crate::object::ObjectStore;
use crate::{
    CHUNK_PREFIX, DEFAULT_INPUT_DIR, JOBS_PREFIX, MERGE_PREFIX, PIPELINES_PREFIX, PLAN_PREFIX,
    SHARD_PREFIX,
};
use async_trait::async_trait;
use sluice_core::coord::{ChunkState, MergeState, Plan, ShardInfo};
use sluice_core::hashtree::OrderedTree;
use sluice_core::input::Input;
use sluice_core::job::{JobInfo, JobState, PipelineRecord};
use sluice_core::pipeline::PipelineSpec;
use sluice_core::stats::ProcessStats;
use sluice_store::{run_in_txn, Collection, Kv, Txn, TxnResponse};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Options for constructing a [`MockDriver`].
#[derive(Debug, Clone)]
pub struct MockOptions {
    pub num_workers: usize,
    pub prefix: String,
    pub spec: Arc<PipelineSpec>,
}

impl MockOptions {
    pub fn new(prefix: impl Into<String>, spec: PipelineSpec) -> Self {
        Self {
            num_workers: 1,
            prefix: prefix.into(),
            spec: Arc::new(spec),
        }
    }
}

/// The mock implementation of the driver contract.
#[derive(Clone)]
pub struct MockDriver {
    kv: Arc<dyn Kv>,
    options: MockOptions,
    input_dir: PathBuf,
    cancel: CancellationToken,
}

impl MockDriver {
    pub fn new(kv: Arc<dyn Kv>, options: MockOptions) -> Arc<Self> {
        Arc::new(Self {
            kv,
            options,
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            cancel: CancellationToken::new(),
        })
    }

    fn collection<V: serde::Serialize + serde::de::DeserializeOwned>(
        &self,
        tail: String,
    ) -> Collection<V> {
        Collection::new(Arc::clone(&self.kv), format!("{}/{tail}", self.options.prefix))
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn jobs(&self) -> Collection<JobInfo> {
        self.collection(JOBS_PREFIX.to_string())
    }

    fn pipelines(&self) -> Collection<PipelineRecord> {
        self.collection(PIPELINES_PREFIX.to_string())
    }

    fn plans(&self) -> Collection<Plan> {
        self.collection(PLAN_PREFIX.to_string())
    }

    fn shards(&self) -> Collection<ShardInfo> {
        self.collection(format!("{SHARD_PREFIX}/{}", self.options.spec.name))
    }

    fn chunks(&self, job_id: &str) -> Collection<ChunkState> {
        self.collection(format!("{CHUNK_PREFIX}/{job_id}"))
    }

    fn merges(&self, job_id: &str) -> Collection<MergeState> {
        self.collection(format!("{MERGE_PREFIX}/{job_id}"))
    }

    fn pipeline_spec(&self) -> &PipelineSpec {
        &self.options.spec
    }

    fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// No object store is configured on the mock.
    fn object_store(&self) -> Option<Arc<dyn ObjectStore>> {
        None
    }

    async fn expected_num_workers(&self) -> Result<usize, DriverError> {
        Ok(self.options.num_workers.max(1))
    }

    fn with_cancel(&self, cancel: CancellationToken) -> Arc<dyn Driver> {
        let mut clone = self.clone();
        clone.cancel = cancel;
        Arc::new(clone)
    }

    /// Invokes the callback with fresh stats; no data is staged.
    async fn with_data(
        &self,
        _inputs: &[Input],
        _stats_tree: Option<&mut OrderedTree>,
        _logger: &DatumLogger,
        cb: WithDataCallback,
    ) -> Result<ProcessStats, DriverError> {
        let stats = ProcessStats::default();
        cb(&stats).await?;
        Ok(stats)
    }

    async fn run_user_code(
        &self,
        _logger: &DatumLogger,
        _env: &[(String, String)],
        _stats: &ProcessStats,
        _timeout: Option<Duration>,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn run_user_error_handling_code(
        &self,
        _logger: &DatumLogger,
        _env: &[(String, String)],
        _stats: &ProcessStats,
        _timeout: Option<Duration>,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn update_job_state(
        &self,
        job_id: &str,
        state: JobState,
        reason: &str,
    ) -> Result<(), DriverError> {
        let jobs = self.jobs();
        let pipelines = self.pipelines();
        let job_id = job_id.to_owned();
        let reason = reason.to_owned();
        run_in_txn(Arc::clone(&self.kv), move |txn| {
            let jobs = jobs.clone();
            let pipelines = pipelines.clone();
            let job_id = job_id.clone();
            let reason = reason.clone();
            Box::pin(async move {
                jobstate::update_job_state(&pipelines, &jobs, txn, &job_id, state, &reason).await
            })
        })
        .await?;
        Ok(())
    }

    /// Deletes the job entry only; the mock does not keep pipeline
    /// counters in step.
    async fn delete_job(&self, txn: &mut Txn, job: &JobInfo) -> Result<(), DriverError> {
        self.jobs().read_write(txn).delete(&job.job);
        Ok(())
    }

    fn report_upload_stats(&self, _started: Instant, _stats: &ProcessStats, _logger: &DatumLogger) {}

    async fn run_in_txn(&self, body: &mut TxnBody<'_>) -> Result<TxnResponse, DriverError> {
        Ok(run_in_txn(Arc::clone(&self.kv), body).await?)
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
