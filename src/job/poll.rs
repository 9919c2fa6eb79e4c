//! Polling a job to its terminal state.
//!
//! Each poll is a read-only, idempotent status fetch. The interval between
//! polls starts small and doubles up to a bounded ceiling. Cancellation is
//! purely local: dropping the returned future stops polling and nothing
//! else — the remote job keeps running and its identifier stays queryable.
//!
//! The poller never retries a failed poll and never resubmits anything;
//! transport failures surface to the caller, who alone decides whether a
//! status fetch (safe, idempotent) is worth reissuing.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PollOptions;
use crate::error::{BulkError, RemoteErrorPayload};
use crate::job::{Job, JobStatus};

/// Doubling backoff, clamped to the ceiling.
pub(crate) fn next_interval(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

/// Classify a terminal errored job into the taxonomy.
///
/// The structured payload passes through whole; a payload that does not
/// decode is a broken server contract and reports as a transport failure
/// with the raw content preserved in the message.
pub(crate) fn classify_errored_job(job: &Job) -> BulkError {
    match &job.error {
        Some(raw) => match serde_json::from_value::<RemoteErrorPayload>(raw.clone()) {
            Ok(payload) => BulkError::from_remote(payload),
            Err(_) => BulkError::TransportFailure {
                message: format!("job {} errored with unrecognized payload: {raw}", job.job_id),
            },
        },
        None => BulkError::TransportFailure {
            message: format!("job {} errored without an error payload", job.job_id),
        },
    }
}

/// Poll `fetch` until the job is terminal or `opts.timeout` elapses.
///
/// On `completed` the job is returned with its result payload verbatim. On
/// `errored` the classified error is returned, never suppressed. On timeout
/// the outcome is `JobTimeout` carrying the job id — distinct from failure,
/// because the job may yet finish remotely.
pub(crate) async fn poll_until_terminal<F, Fut>(
    job_id: &str,
    opts: &PollOptions,
    mut fetch: F,
) -> Result<Job, BulkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Job, BulkError>>,
{
    let start = Instant::now();
    let mut interval = opts.initial_interval;
    let mut last_status: Option<JobStatus> = None;

    loop {
        let job = fetch().await?;

        if last_status != Some(job.status) {
            debug!(job_id, status = %job.status, "job status");
            if let Some(last) = last_status {
                if job.status.rank() < last.rank() {
                    // Terminal states are final; a backwards report is a
                    // server anomaly worth surfacing in logs.
                    warn!(job_id, from = %last, to = %job.status, "job status regressed");
                }
            }
            last_status = Some(job.status);
        }

        match job.status {
            JobStatus::Completed => return Ok(job),
            JobStatus::Errored => return Err(classify_errored_job(&job)),
            JobStatus::Pending | JobStatus::Running => {}
        }

        let elapsed = start.elapsed();
        if elapsed >= opts.timeout {
            return Err(BulkError::JobTimeout {
                job_id: job_id.to_string(),
                waited: elapsed,
            });
        }
        let remaining = opts.timeout - elapsed;
        tokio::time::sleep(interval.min(remaining)).await;
        interval = next_interval(interval, opts.max_interval);
    }
}
