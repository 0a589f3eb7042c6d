// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The driver contract and its real implementation.
//!
//! [`WorkerDriver`] owns the per-datum critical path: scratch allocation,
//! input staging, user-code execution, output upload, and cleanup, plus
//! the typed coordination collections and the job state machine. The
//! [`Driver`] trait is deliberately narrow so tests can swap the heavy
//! subsystems for [`crate::mock::MockDriver`] while keeping the
//! coordination store real.

use crate::cluster::{expected_workers, WorkerCluster};
use crate::error::DriverError;
use crate::git;
use crate::identity::{lookup_runtime_user, RuntimeIdentity};
use crate::jobstate;
use crate::logger::DatumLogger;
use crate::object::ObjectStore;
use crate::runner::{run_command, RunSpec};
use crate::scratch;
use crate::stage::{self, Puller};
use crate::stats::{Entitlement, StatsReporter};
use crate::upload;
use crate::{
    CHUNK_PREFIX, CONCURRENCY, DEFAULT_INPUT_DIR, JOBS_PREFIX, MERGE_PREFIX, PIPELINES_PREFIX,
    PLAN_PREFIX, SHARD_PREFIX,
};
use async_trait::async_trait;
use sluice_core::coord::{ChunkState, MergeState, Plan, ShardInfo};
use sluice_core::hashtree::OrderedTree;
use sluice_core::input::Input;
use sluice_core::job::{JobInfo, JobState, PipelineRecord};
use sluice_core::pipeline::PipelineSpec;
use sluice_core::stats::ProcessStats;
use sluice_store::{run_in_txn, Collection, Kv, Txn, TxnFuture, TxnResponse};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Boxed future returned by [`WithDataCallback`].
pub type DriverFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DriverError>> + Send + 'a>>;

/// The user-code phase of one datum, invoked with the datum's stats while
/// the inputs are staged and linked.
pub type WithDataCallback = Box<dyn for<'a> FnOnce(&'a ProcessStats) -> DriverFuture<'a> + Send>;

/// Body type for [`Driver::run_in_txn`].
pub type TxnBody<'b> = dyn for<'a> FnMut(&'a mut Txn) -> TxnFuture<'a> + Send + 'b;

/// The common functions worker code needs around datum execution.
#[async_trait]
pub trait Driver: Send + Sync {
    fn jobs(&self) -> Collection<JobInfo>;
    fn pipelines(&self) -> Collection<PipelineRecord>;
    fn plans(&self) -> Collection<Plan>;
    /// Filesystem shards available for this pipeline; workers claim them.
    fn shards(&self) -> Collection<ShardInfo>;
    /// Chunk claims for one job; parameterised so removing the job prefix
    /// removes every entry.
    fn chunks(&self, job_id: &str) -> Collection<ChunkState>;
    fn merges(&self, job_id: &str) -> Collection<MergeState>;

    fn pipeline_spec(&self) -> &PipelineSpec;

    /// The path containing the input filesets for the job.
    fn input_dir(&self) -> &Path;

    /// The object-store client, absent on the mock driver.
    fn object_store(&self) -> Option<Arc<dyn ObjectStore>>;

    /// Workers this pipeline should run, per the cluster orchestrator.
    async fn expected_num_workers(&self) -> Result<usize, DriverError>;

    /// A shallow clone whose blocking operations observe `cancel`.
    fn with_cancel(&self, cancel: CancellationToken) -> Arc<dyn Driver>;

    /// Prepare the node to run user code over `inputs`: stage, link, run
    /// `cb`, drain, and clean up afterwards, on every path.
    async fn with_data(
        &self,
        inputs: &[Input],
        stats_tree: Option<&mut OrderedTree>,
        logger: &DatumLogger,
        cb: WithDataCallback,
    ) -> Result<ProcessStats, DriverError>;

    /// Run the pipeline's configured code.
    async fn run_user_code(
        &self,
        logger: &DatumLogger,
        env: &[(String, String)],
        stats: &ProcessStats,
        timeout: Option<Duration>,
    ) -> Result<(), DriverError>;

    /// Run the pipeline's configured error-handling code.
    async fn run_user_error_handling_code(
        &self,
        logger: &DatumLogger,
        env: &[(String, String)],
        stats: &ProcessStats,
        timeout: Option<Duration>,
    ) -> Result<(), DriverError>;

    /// Transition a job's state and its pipeline's counters atomically.
    async fn update_job_state(
        &self,
        job_id: &str,
        state: JobState,
        reason: &str,
    ) -> Result<(), DriverError>;

    /// Delete a job entry inside an ambient transaction.
    async fn delete_job(&self, txn: &mut Txn, job: &JobInfo) -> Result<(), DriverError>;

    fn report_upload_stats(&self, started: Instant, stats: &ProcessStats, logger: &DatumLogger);

    /// Run `body` in an optimistic transaction with retry on conflict.
    async fn run_in_txn(&self, body: &mut TxnBody<'_>) -> Result<TxnResponse, DriverError>;
}

/// Identity-lookup and filesystem knobs, overridable by tests.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub input_dir: PathBuf,
    pub passwd_path: PathBuf,
    pub group_path: PathBuf,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            passwd_path: PathBuf::from("/etc/passwd"),
            group_path: PathBuf::from("/etc/group"),
        }
    }
}

/// The real driver.
#[derive(Clone)]
pub struct WorkerDriver {
    spec: Arc<PipelineSpec>,
    object_store: Arc<dyn ObjectStore>,
    kv: Arc<dyn Kv>,
    prefix: String,
    cluster: Arc<dyn WorkerCluster>,
    identity: Option<RuntimeIdentity>,
    stats: StatsReporter,
    input_dir: PathBuf,
    cancel: CancellationToken,
}

impl WorkerDriver {
    /// Construct a driver, resolving the runtime identity from the
    /// transform's user spec and probing the enterprise entitlement to
    /// decide whether stats are exported.
    pub async fn new(
        spec: Arc<PipelineSpec>,
        object_store: Arc<dyn ObjectStore>,
        kv: Arc<dyn Kv>,
        prefix: impl Into<String>,
        cluster: Arc<dyn WorkerCluster>,
        entitlement: Arc<dyn Entitlement>,
    ) -> Result<Arc<Self>, DriverError> {
        Self::with_options(
            spec,
            object_store,
            kv,
            prefix,
            cluster,
            entitlement,
            DriverOptions::default(),
        )
        .await
    }

    pub async fn with_options(
        spec: Arc<PipelineSpec>,
        object_store: Arc<dyn ObjectStore>,
        kv: Arc<dyn Kv>,
        prefix: impl Into<String>,
        cluster: Arc<dyn WorkerCluster>,
        entitlement: Arc<dyn Entitlement>,
        options: DriverOptions,
    ) -> Result<Arc<Self>, DriverError> {
        let identity = match spec.transform.user.as_deref() {
            Some(user) if !user.is_empty() => {
                lookup_runtime_user(user, &options.passwd_path, &options.group_path)?
            }
            _ => None,
        };

        let export_stats = match entitlement.active().await {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(error = %e, "failed to probe enterprise entitlement, stats stay off");
                false
            }
        };

        let stats = StatsReporter::new(export_stats, spec.id.clone());
        Ok(Arc::new(Self {
            spec,
            object_store,
            kv,
            prefix: prefix.into(),
            cluster,
            identity,
            stats,
            input_dir: options.input_dir,
            cancel: CancellationToken::new(),
        }))
    }

    /// The identity user code runs under, when one was resolved.
    pub fn identity(&self) -> Option<RuntimeIdentity> {
        self.identity
    }

    fn collection<V: serde::Serialize + serde::de::DeserializeOwned>(
        &self,
        tail: String,
    ) -> Collection<V> {
        Collection::new(Arc::clone(&self.kv), format!("{}/{tail}", self.prefix))
    }

    /// Stream `<input_dir>/out` into the object store and tag the
    /// resulting tree with the datum tag. Returns the serialized tree.
    pub async fn upload_output(
        &self,
        tag: &str,
        logger: &DatumLogger,
        inputs: &[Input],
        stats: &ProcessStats,
        stats_tree: Option<&mut OrderedTree>,
    ) -> Result<Vec<u8>, DriverError> {
        let started = Instant::now();
        logger.log("starting to upload output");
        let result = upload::upload_output(
            &self.object_store,
            &self.input_dir,
            tag,
            inputs,
            stats,
            stats_tree,
        )
        .await;
        self.stats.report_upload(started, stats, logger);
        match &result {
            Ok(_) => logger.log(&format!(
                "finished uploading output after {:?}",
                started.elapsed()
            )),
            Err(e) => logger.log(&format!(
                "errored uploading output after {:?}: {e}",
                started.elapsed()
            )),
        }
        result
    }

    async fn download_data(
        &self,
        scratch: &Path,
        inputs: &[Input],
        puller: &Puller,
        mut stats_tree: Option<&mut OrderedTree>,
        logger: &DatumLogger,
        stats: &ProcessStats,
    ) -> Result<(), DriverError> {
        let started = Instant::now();
        logger.log("starting to download data");
        let result = self
            .download_data_inner(scratch, inputs, puller, stats_tree.as_deref_mut())
            .await;
        self.stats.report_download_time(started, stats, logger);
        match &result {
            Ok(()) => logger.log(&format!(
                "finished downloading data after {:?}",
                started.elapsed()
            )),
            Err(e) => logger.log(&format!(
                "errored downloading data after {:?}: {e}",
                started.elapsed()
            )),
        }
        result
    }

    async fn download_data_inner(
        &self,
        scratch: &Path,
        inputs: &[Input],
        puller: &Puller,
        mut stats_tree: Option<&mut OrderedTree>,
    ) -> Result<(), DriverError> {
        for input in inputs {
            if input.git_url.is_some() {
                git::download_git_data(&self.object_store, scratch, input).await?;
                continue;
            }
            let file = &input.file;
            let dest = scratch
                .join(&input.name)
                .join(file.path.trim_start_matches('/'));
            let stats_root = format!("{}/{}", input.name, file.path.trim_matches('/'));
            if let Some(tree) = stats_tree.as_deref_mut() {
                if let Some((parent, _)) = stats_root.rsplit_once('/') {
                    tree.mkdir_all(parent);
                }
            }
            puller
                .pull(
                    &dest,
                    file,
                    input.lazy,
                    input.empty_files,
                    stats_tree.as_deref_mut(),
                    &stats_root,
                )
                .await?;
        }
        Ok(())
    }

    async fn run_with_staged(
        &self,
        scratch: &Path,
        inputs: &[Input],
        puller: &Puller,
        stats: &ProcessStats,
        logger: &DatumLogger,
        cb: WithDataCallback,
        linked: &mut bool,
    ) -> Result<(), DriverError> {
        tokio::fs::create_dir_all(&self.input_dir).await?;
        stage::link_data(&self.input_dir, inputs, scratch).await?;
        *linked = true;

        // If a custom user executes the process, the input directory and
        // everything under it must be owned by it.
        if let Some(identity) = self.identity {
            chown_all(&self.input_dir, identity)?;
        }

        cb(stats).await?;

        // Drain lazy pulls now rather than in the deferred cleanup: a pull
        // that failed mid-stream means the user code may have seen a
        // truncated file, so the datum must fail.
        let drained = puller.cleanup().await?;
        stats.add_download_bytes(drained);
        self.stats.report_download_size(drained, logger);
        Ok(())
    }
}

#[async_trait]
impl Driver for WorkerDriver {
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
        self.collection(format!("{SHARD_PREFIX}/{}", self.spec.name))
    }

    fn chunks(&self, job_id: &str) -> Collection<ChunkState> {
        self.collection(format!("{CHUNK_PREFIX}/{job_id}"))
    }

    fn merges(&self, job_id: &str) -> Collection<MergeState> {
        self.collection(format!("{MERGE_PREFIX}/{job_id}"))
    }

    fn pipeline_spec(&self) -> &PipelineSpec {
        &self.spec
    }

    fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    fn object_store(&self) -> Option<Arc<dyn ObjectStore>> {
        Some(Arc::clone(&self.object_store))
    }

    async fn expected_num_workers(&self) -> Result<usize, DriverError> {
        let nodes = self.cluster.node_count().await?;
        Ok(expected_workers(nodes, &self.spec.parallelism))
    }

    fn with_cancel(&self, cancel: CancellationToken) -> Arc<dyn Driver> {
        let mut clone = self.clone();
        clone.cancel = cancel;
        Arc::new(clone)
    }

    async fn with_data(
        &self,
        inputs: &[Input],
        mut stats_tree: Option<&mut OrderedTree>,
        logger: &DatumLogger,
        cb: WithDataCallback,
    ) -> Result<ProcessStats, DriverError> {
        let puller = Puller::new(
            Arc::clone(&self.object_store),
            CONCURRENCY,
            self.cancel.child_token(),
        );
        let stats = ProcessStats::default();
        let mut first_err: Option<DriverError> = None;
        let mut linked = false;

        let scratch = match scratch::allocate(&self.input_dir, self.spec.spout).await {
            Ok(path) => Some(path),
            Err(e) => {
                first_err = Some(e);
                None
            }
        };

        if first_err.is_none() {
            if let Some(path) = scratch.clone() {
                let staged = self
                    .download_data(
                        &path,
                        inputs,
                        &puller,
                        stats_tree.as_deref_mut(),
                        logger,
                        &stats,
                    )
                    .await;
                match staged {
                    Ok(()) => {
                        if let Err(e) = self
                            .run_with_staged(
                                &path, inputs, &puller, &stats, logger, cb, &mut linked,
                            )
                            .await
                        {
                            first_err = Some(e);
                        }
                    }
                    Err(e) => first_err = Some(e),
                }
            }
        }

        // Deferred cleanup chain. Every step runs; the first real error
        // wins, later cleanup errors are discarded.
        if linked {
            if let Err(e) = stage::unlink_data(&self.input_dir).await {
                first_err.get_or_insert(e);
            }
        }
        // Idempotent second cleanup, before scratch removal so no pipe is
        // opened against a deleted path.
        if let Err(e) = puller.cleanup().await {
            first_err.get_or_insert(e);
        }
        if let Some(path) = &scratch {
            if let Err(e) = scratch::teardown(path).await {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    async fn run_user_code(
        &self,
        logger: &DatumLogger,
        env: &[(String, String)],
        stats: &ProcessStats,
        timeout: Option<Duration>,
    ) -> Result<(), DriverError> {
        let started = Instant::now();
        self.stats.user_code_started(logger);
        logger.log("beginning to run user code");
        let transform = &self.spec.transform;
        let result = run_command(
            RunSpec {
                cmd: &transform.cmd,
                stdin: &transform.stdin,
                working_dir: transform.working_dir.as_deref(),
                identity: self.identity,
                env,
                accept_return_codes: &transform.accept_return_codes,
                timeout: timeout.or(self.spec.datum_timeout),
            },
            &self.cancel,
            logger,
        )
        .await;
        self.stats
            .user_code_finished(result.is_err(), started, stats, logger);
        match &result {
            Ok(()) => logger.log(&format!(
                "finished running user code after {:?}",
                started.elapsed()
            )),
            Err(e) => logger.log(&format!(
                "errored running user code after {:?}: {e}",
                started.elapsed()
            )),
        }
        result
    }

    async fn run_user_error_handling_code(
        &self,
        logger: &DatumLogger,
        env: &[(String, String)],
        _stats: &ProcessStats,
        timeout: Option<Duration>,
    ) -> Result<(), DriverError> {
        let started = Instant::now();
        logger.log("beginning to run user error handling code");
        let transform = &self.spec.transform;
        let result = run_command(
            RunSpec {
                cmd: &transform.err_cmd,
                stdin: &transform.err_stdin,
                working_dir: transform.working_dir.as_deref(),
                identity: self.identity,
                env,
                accept_return_codes: &transform.accept_return_codes,
                timeout: timeout.or(self.spec.datum_timeout),
            },
            &self.cancel,
            logger,
        )
        .await;
        match &result {
            Ok(()) => logger.log(&format!(
                "finished running user error handling code after {:?}",
                started.elapsed()
            )),
            Err(e) => logger.log(&format!(
                "errored running user error handling code after {:?}: {e}",
                started.elapsed()
            )),
        }
        result
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

    async fn delete_job(&self, txn: &mut Txn, job: &JobInfo) -> Result<(), DriverError> {
        let jobs = self.jobs();
        let pipelines = self.pipelines();
        jobstate::delete_job(&pipelines, &jobs, txn, job).await?;
        Ok(())
    }

    fn report_upload_stats(&self, started: Instant, stats: &ProcessStats, logger: &DatumLogger) {
        self.stats.report_upload(started, stats, logger);
    }

    async fn run_in_txn(&self, body: &mut TxnBody<'_>) -> Result<TxnResponse, DriverError> {
        Ok(run_in_txn(Arc::clone(&self.kv), body).await?)
    }
}

/// Recursively chown the tree at `root` to `identity`.
fn chown_all(root: &Path, identity: RuntimeIdentity) -> Result<(), DriverError> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| DriverError::Io(std::io::Error::other(e)))?;
        std::os::unix::fs::chown(entry.path(), Some(identity.uid), Some(identity.gid))?;
    }
    Ok(())
}
