// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sluice_store::{run_in_txn, Kv, MemKv};
use std::sync::Arc;

struct Harness {
    kv: Arc<MemKv>,
    jobs: Collection<JobInfo>,
    pipelines: Collection<PipelineRecord>,
}

fn harness() -> Harness {
    let kv = MemKv::new();
    let store: Arc<dyn Kv> = kv.clone();
    Harness {
        kv,
        jobs: Collection::new(Arc::clone(&store), "/sluice/jobs"),
        pipelines: Collection::new(store, "/sluice/pipelines"),
    }
}

async fn seed_job(h: &Harness, job_id: &str, state: JobState) {
    let store: Arc<dyn Kv> = h.kv.clone();
    let jobs = h.jobs.clone();
    let pipelines = h.pipelines.clone();
    let job_id = job_id.to_owned();
    run_in_txn(store, move |txn| {
        let jobs = jobs.clone();
        let pipelines = pipelines.clone();
        let job_id = job_id.clone();
        Box::pin(async move {
            let mut job = JobInfo::new(&job_id, "edges");
            job.state = state;
            jobs.read_write(txn).put(&job_id, &job)?;
            pipelines
                .read_write(txn)
                .upsert(
                    "edges",
                    || PipelineRecord::new("edges"),
                    |record| record.increment(state),
                )
                .await?;
            Ok(())
        })
    })
    .await
    .unwrap();
}

async fn read_state(h: &Harness) -> (JobInfo, PipelineRecord) {
    let store: Arc<dyn Kv> = h.kv.clone();
    let jobs = h.jobs.clone();
    let pipelines = h.pipelines.clone();
    let out = Arc::new(parking_lot::Mutex::new(None));
    let slot = Arc::clone(&out);
    run_in_txn(store, move |txn| {
        let jobs = jobs.clone();
        let pipelines = pipelines.clone();
        let slot = Arc::clone(&slot);
        Box::pin(async move {
            let job = jobs.read_write(txn).try_get("j1").await?;
            let record = pipelines.read_write(txn).try_get("edges").await?;
            *slot.lock() = Some((job, record));
            Ok(())
        })
    })
    .await
    .unwrap();
    let (job, record) = out.lock().take().unwrap();
    (job.unwrap_or_default(), record.unwrap_or_default())
}

#[tokio::test]
async fn transition_moves_pipeline_counters() {
    let h = harness();
    seed_job(&h, "j1", JobState::Starting).await;

    let store: Arc<dyn Kv> = h.kv.clone();
    let jobs = h.jobs.clone();
    let pipelines = h.pipelines.clone();
    run_in_txn(store, move |txn| {
        let jobs = jobs.clone();
        let pipelines = pipelines.clone();
        Box::pin(async move {
            update_job_state(&pipelines, &jobs, txn, "j1", JobState::Running, "").await
        })
    })
    .await
    .unwrap();

    let (job, record) = read_state(&h).await;
    assert_eq!(job.state, JobState::Running);
    assert_eq!(record.count(JobState::Starting), 0);
    assert_eq!(record.count(JobState::Running), 1);
    assert_eq!(record.total_jobs(), 1);
}

#[tokio::test]
async fn transition_records_reason() {
    let h = harness();
    seed_job(&h, "j1", JobState::Running).await;

    let store: Arc<dyn Kv> = h.kv.clone();
    let jobs = h.jobs.clone();
    let pipelines = h.pipelines.clone();
    run_in_txn(store, move |txn| {
        let jobs = jobs.clone();
        let pipelines = pipelines.clone();
        Box::pin(async move {
            update_job_state(&pipelines, &jobs, txn, "j1", JobState::Killed, "cancelled by user")
                .await
        })
    })
    .await
    .unwrap();

    let (job, _) = read_state(&h).await;
    assert_eq!(job.state, JobState::Killed);
    assert_eq!(job.reason, "cancelled by user");
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let h = harness();
    let store: Arc<dyn Kv> = h.kv.clone();
    let jobs = h.jobs.clone();
    let pipelines = h.pipelines.clone();
    let err = run_in_txn(store, move |txn| {
        let jobs = jobs.clone();
        let pipelines = pipelines.clone();
        Box::pin(async move {
            update_job_state(&pipelines, &jobs, txn, "ghost", JobState::Running, "").await
        })
    })
    .await
    .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn delete_job_decrements_without_reincrement() {
    let h = harness();
    seed_job(&h, "j1", JobState::Failure).await;

    let store: Arc<dyn Kv> = h.kv.clone();
    let jobs = h.jobs.clone();
    let pipelines = h.pipelines.clone();
    run_in_txn(store, {
        let jobs = jobs.clone();
        let pipelines = pipelines.clone();
        move |txn| {
            let jobs = jobs.clone();
            let pipelines = pipelines.clone();
            Box::pin(async move {
                let job = jobs.read_write(txn).get("j1").await?;
                delete_job(&pipelines, &jobs, txn, &job).await
            })
        }
    })
    .await
    .unwrap();

    let (_, record) = read_state(&h).await;
    assert_eq!(record.total_jobs(), 0);

    // The job entry itself is gone.
    let store: Arc<dyn Kv> = h.kv.clone();
    run_in_txn(store, move |txn| {
        let jobs = jobs.clone();
        Box::pin(async move {
            assert!(jobs.read_write(txn).try_get("j1").await?.is_none());
            Ok(())
        })
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn delete_job_floors_counter_at_zero() {
    let h = harness();
    // Seed a job entry whose state was never counted on the pipeline.
    let store: Arc<dyn Kv> = h.kv.clone();
    let jobs = h.jobs.clone();
    let pipelines = h.pipelines.clone();
    run_in_txn(store, {
        let jobs = jobs.clone();
        let pipelines = pipelines.clone();
        move |txn| {
            let jobs = jobs.clone();
            let pipelines = pipelines.clone();
            Box::pin(async move {
                let mut job = JobInfo::new("j1", "edges");
                job.state = JobState::Killed;
                jobs.read_write(txn).put("j1", &job)?;
                pipelines
                    .read_write(txn)
                    .put("edges", &PipelineRecord::new("edges"))?;
                Ok(())
            })
        }
    })
    .await
    .unwrap();

    let store: Arc<dyn Kv> = h.kv.clone();
    run_in_txn(store, move |txn| {
        let jobs = jobs.clone();
        let pipelines = pipelines.clone();
        Box::pin(async move {
            let job = jobs.read_write(txn).get("j1").await?;
            delete_job(&pipelines, &jobs, txn, &job).await
        })
    })
    .await
    .unwrap();

    let (_, record) = read_state(&h).await;
    assert_eq!(record.count(JobState::Killed), 0);
    assert_eq!(record.total_jobs(), 0);
}
