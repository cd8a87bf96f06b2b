//! Worker running the configured purge jobs on an interval.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    config::{PurgerConfig, ScheduledJob},
    purge::{PurgeReport, PurgeResult, run_purge},
};

/// Results from a single pass over the scheduled jobs.
#[derive(Debug, Default)]
pub struct ScheduleRunResult {
    /// Jobs that completed.
    pub succeeded: usize,
    /// Jobs that failed. A failed job does not stop the pass.
    pub failed: usize,
    pub rows_deleted: u64,
    pub rows_nulled: u64,
}

impl ScheduleRunResult {
    pub fn total(&self) -> u64 {
        self.rows_deleted + self.rows_nulled
    }

    pub fn has_deletions(&self) -> bool {
        self.total() > 0
    }

    fn record(&mut self, report: &PurgeReport) {
        self.succeeded += 1;
        self.rows_deleted += report.rows_deleted();
        self.rows_nulled += report.rows_nulled();
    }
}

/// Starts the scheduled purge worker.
///
/// Runs every job, then sleeps for the configured interval. Runs until the
/// task is cancelled.
pub async fn start_scheduled_purge_worker(config: Arc<PurgerConfig>) {
    let schedule = &config.schedule;
    if !schedule.enabled {
        tracing::info!("Scheduled purge worker disabled by configuration");
        return;
    }

    if schedule.jobs.is_empty() {
        tracing::info!("Scheduled purge worker enabled but no jobs configured");
        return;
    }

    tracing::info!(
        interval_hours = schedule.interval_hours,
        jobs = schedule.jobs.len(),
        "Starting scheduled purge worker"
    );

    let interval = schedule.interval();

    loop {
        let result = run_scheduled_jobs(&config, Utc::now()).await;
        if result.failed > 0 {
            tracing::warn!(
                succeeded = result.succeeded,
                failed = result.failed,
                deleted = result.rows_deleted,
                nulled = result.rows_nulled,
                "Scheduled purge pass finished with failures"
            );
        } else if result.has_deletions() {
            tracing::info!(
                succeeded = result.succeeded,
                deleted = result.rows_deleted,
                nulled = result.rows_nulled,
                "Scheduled purge pass complete"
            );
        } else {
            tracing::debug!("Scheduled purge pass complete, no rows to delete");
        }

        tokio::time::sleep(interval).await;
    }
}

/// Run every scheduled job once, in order, resolving relative times
/// against `now`.
pub async fn run_scheduled_jobs(config: &PurgerConfig, now: DateTime<Utc>) -> ScheduleRunResult {
    let mut result = ScheduleRunResult::default();

    for job in &config.schedule.jobs {
        match run_job(config, job, now).await {
            Ok(report) => {
                tracing::info!(
                    job = job.label(),
                    run_id = %report.run_id,
                    deleted = report.rows_deleted(),
                    nulled = report.rows_nulled(),
                    dry_run = report.dry_run,
                    "Scheduled purge complete"
                );
                result.record(&report);
            }
            Err(e) => {
                tracing::error!(job = job.label(), error = %e, "Error running scheduled purge");
                result.failed += 1;
            }
        }
    }

    result
}

async fn run_job(
    config: &PurgerConfig,
    job: &ScheduledJob,
    now: DateTime<Utc>,
) -> PurgeResult<PurgeReport> {
    let mut request = job.to_event().into_request(now)?;
    request.dry_run = job.dry_run;
    run_purge(config, &request).await
}
