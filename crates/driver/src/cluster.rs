// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The cluster-orchestration surface the driver consumes: node counts for
//! coefficient parallelism.

use crate::error::DriverError;
use async_trait::async_trait;
use sluice_core::pipeline::ParallelismSpec;

/// Lookup of the cluster's current node count.
#[async_trait]
pub trait WorkerCluster: Send + Sync {
    async fn node_count(&self) -> Result<usize, DriverError>;
}

/// A fixed-size cluster; the default for tests and single-node setups.
#[derive(Debug, Clone, Copy)]
pub struct StaticCluster(pub usize);

#[async_trait]
impl WorkerCluster for StaticCluster {
    async fn node_count(&self) -> Result<usize, DriverError> {
        Ok(self.0)
    }
}

/// Workers a pipeline should run given the cluster size.
pub(crate) fn expected_workers(nodes: usize, spec: &ParallelismSpec) -> usize {
    match spec {
        ParallelismSpec::Constant(0) => 1,
        ParallelismSpec::Constant(n) => *n as usize,
        ParallelismSpec::Coefficient(c) => ((c * nodes as f64).round() as usize).max(1),
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;
