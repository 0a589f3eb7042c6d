// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sluice-driver: the per-datum execution engine of a worker replica.
//!
//! For each datum the driver stages inputs onto a local scratch
//! filesystem, runs the pipeline's user code under a configured identity
//! with a timeout, streams outputs into the content-addressed object store
//! as a hash-tree manifest, and keeps job state and worker coordination in
//! the shared transactional store.
//!
//! The [`Driver`] trait is the contract the spawner programs against; the
//! real implementation is [`WorkerDriver`], and [`mock::MockDriver`]
//! short-circuits the heavy I/O while keeping coordination-store behaviour
//! intact for tests.

pub mod cluster;
pub mod driver;
pub mod error;
pub mod git;
pub mod identity;
mod jobstate;
pub mod logger;
pub mod mock;
pub mod object;
mod runner;
pub mod scratch;
pub mod stage;
pub mod stats;
pub mod upload;

pub use cluster::{StaticCluster, WorkerCluster};
pub use driver::{
    Driver, DriverFuture, DriverOptions, TxnBody, WithDataCallback, WorkerDriver,
};
pub use error::DriverError;
pub use identity::{lookup_runtime_user, RuntimeIdentity};
pub use logger::DatumLogger;
pub use mock::{MockDriver, MockOptions};
pub use object::{BlockWriter, FileInfo, MemObjectStore, ObjectInfo, ObjectStore};
pub use stage::Puller;
pub use stats::{Entitlement, NoEntitlement, StaticEntitlement};

/// The maximum number of concurrent download operations per datum.
pub const CONCURRENCY: usize = 100;

/// Where user code sees its inputs and output directory.
pub const DEFAULT_INPUT_DIR: &str = "/pfs";

/// Directory under the input dir holding per-datum scratch spaces.
pub const SCRATCH_SPACE: &str = ".scratch";

/// Per-job coordination namespaces under the store prefix.
pub const CHUNK_PREFIX: &str = "chunk";
pub const MERGE_PREFIX: &str = "merge";
pub const PLAN_PREFIX: &str = "plan";
pub const SHARD_PREFIX: &str = "shard";

/// Job and pipeline entries live beside the per-job namespaces.
pub const JOBS_PREFIX: &str = "jobs";
pub const PIPELINES_PREFIX: &str = "pipelines";
