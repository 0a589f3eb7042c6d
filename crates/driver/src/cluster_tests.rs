// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn constant_parallelism_is_used_directly() {
    assert_eq!(expected_workers(5, &ParallelismSpec::Constant(3)), 3);
}

#[test]
fn constant_zero_means_one() {
    assert_eq!(expected_workers(5, &ParallelismSpec::Constant(0)), 1);
}

#[test]
fn coefficient_scales_with_nodes() {
    assert_eq!(expected_workers(4, &ParallelismSpec::Coefficient(2.0)), 8);
    assert_eq!(expected_workers(3, &ParallelismSpec::Coefficient(0.5)), 2);
}

#[test]
fn coefficient_floors_at_one_worker() {
    assert_eq!(expected_workers(1, &ParallelismSpec::Coefficient(0.1)), 1);
    assert_eq!(expected_workers(0, &ParallelismSpec::Coefficient(3.0)), 1);
}

#[tokio::test]
async fn static_cluster_reports_its_size() {
    let cluster = StaticCluster(7);
    assert_eq!(cluster.node_count().await.unwrap(), 7);
}
