// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job state machine: job entries and their pipeline's per-state
//! tallies move together, inside one transaction.

use sluice_core::job::{JobInfo, JobState, PipelineRecord};
use sluice_store::{Collection, StoreError, Txn};

/// Transition `job_id` to `state`, keeping the owning pipeline's counters
/// in step: the old state's count goes down (floored at zero), the new
/// state's goes up.
pub(crate) async fn update_job_state(
    pipelines: &Collection<PipelineRecord>,
    jobs: &Collection<JobInfo>,
    txn: &mut Txn,
    job_id: &str,
    state: JobState,
    reason: &str,
) -> Result<(), StoreError> {
    let mut job = jobs.read_write(txn).get(job_id).await?;
    let old_state = job.state;

    pipelines
        .read_write(txn)
        .upsert(
            &job.pipeline,
            || PipelineRecord::new(job.pipeline.clone()),
            |record| {
                record.decrement(old_state);
                record.increment(state);
            },
        )
        .await?;

    job.state = state;
    job.reason = reason.to_string();
    let key = job.job.clone();
    jobs.read_write(txn).put(&key, &job)
}

/// Remove a job entry inside an ambient transaction, typically because its
/// output commit is gone. The pipeline's count for the job's state is
/// decremented (floored at zero); nothing is re-incremented, the job no
/// longer exists.
pub(crate) async fn delete_job(
    pipelines: &Collection<PipelineRecord>,
    jobs: &Collection<JobInfo>,
    txn: &mut Txn,
    job: &JobInfo,
) -> Result<(), StoreError> {
    pipelines
        .read_write(txn)
        .upsert(
            &job.pipeline,
            || PipelineRecord::new(job.pipeline.clone()),
            |record| record.decrement(job.state),
        )
        .await?;
    jobs.read_write(txn).delete(&job.job);
    Ok(())
}

#[cfg(test)]
#[path = "jobstate_tests.rs"]
mod tests;
