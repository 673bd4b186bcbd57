//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring pipeline jobs: source polling, window finalization and
//! retention.

use std::sync::Arc;

use competeiq_pipeline::{IngestReport, Pipeline, PipelineError};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Every minute, on the minute.
const POLL_SCHEDULE: &str = "0 * * * * *";
/// Every minute, offset from polling so fresh mentions land first.
const FINALIZE_SCHEDULE: &str = "30 * * * * *";
/// Hourly at minute five.
const RETENTION_SCHEDULE: &str = "0 5 * * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(pipeline: Arc<Pipeline>) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_poll_job(&scheduler, Arc::clone(&pipeline)).await?;
    register_finalize_job(&scheduler, Arc::clone(&pipeline)).await?;
    register_retention_job(&scheduler, pipeline).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_poll_job(
    scheduler: &JobScheduler,
    pipeline: Arc<Pipeline>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(POLL_SCHEDULE, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);
        Box::pin(async move {
            run_poll_cycle(&pipeline).await;
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

async fn register_finalize_job(
    scheduler: &JobScheduler,
    pipeline: Arc<Pipeline>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(FINALIZE_SCHEDULE, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);
        Box::pin(async move {
            run_window_finalization(&pipeline);
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

async fn register_retention_job(
    scheduler: &JobScheduler,
    pipeline: Arc<Pipeline>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(RETENTION_SCHEDULE, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);
        Box::pin(async move {
            tracing::info!("scheduler: starting retention pass");
            if let Err(e) = pipeline.run_retention().await {
                tracing::error!(error = %e, "scheduler: retention pass failed");
            }
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

/// Totals across one scheduled polling cycle.
#[derive(Debug, Default, PartialEq, Eq)]
struct PollSummary {
    sources_polled: usize,
    sources_failed: usize,
    processed: usize,
    alerts: usize,
}

impl PollSummary {
    fn from_results(results: &[(String, Result<IngestReport, PipelineError>)]) -> Self {
        let mut summary = Self::default();
        for (source_id, result) in results {
            summary.sources_polled += 1;
            match result {
                Ok(report) => {
                    summary.processed += report.processed_count;
                    summary.alerts += report.alerts_generated;
                }
                Err(e) => {
                    summary.sources_failed += 1;
                    tracing::warn!(source = %source_id, error = %e, "scheduler: poll failed");
                }
            }
        }
        summary
    }
}

/// Poll every source that is due. One source failing never stops the others.
async fn run_poll_cycle(pipeline: &Pipeline) -> PollSummary {
    let results = pipeline.run_due_polls().await;
    let summary = PollSummary::from_results(&results);
    if summary.sources_polled > 0 {
        tracing::info!(
            polled = summary.sources_polled,
            failed = summary.sources_failed,
            processed = summary.processed,
            alerts = summary.alerts,
            "scheduler: poll cycle complete"
        );
    }
    summary
}

fn run_window_finalization(pipeline: &Pipeline) -> usize {
    let alerts = pipeline.finalize_windows();
    if !alerts.is_empty() {
        tracing::info!(alerts = alerts.len(), "scheduler: window rules fired");
    }
    alerts.len()
}
