use chrono::{DateTime, Utc};
use drip_store::{JobStatus, JobStore, StoredRequest};
use tracing::instrument;

/// What a polling client sees for one job id.
#[derive(Debug, Clone)]
pub enum JobReport {
    NotFound,
    Processing {
        /// Requests with a recorded status or error.
        completed: u64,
        total: u64,
        started_at: String,
        /// Linear-rate extrapolation; `None` until the first request
        /// resolves. Advisory only; early estimates can be wildly off.
        estimated_completion: Option<String>,
    },
    Complete {
        /// Every request in submission order, with its recorded outcome.
        results: Vec<StoredRequest>,
    },
}

/// Read-only view over the job store for client polling.
pub struct StatusReporter {
    store: JobStore,
}

impl StatusReporter {
    /// Wrap a store handle. Callers give the reporter its own connection so
    /// status reads never contend with the drain loop's writes.
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub fn status(&self, job_id: &str) -> drip_store::Result<JobReport> {
        let Some(job) = self.store.job(job_id)? else {
            return Ok(JobReport::NotFound);
        };

        match job.status {
            JobStatus::Complete => Ok(JobReport::Complete {
                results: self.store.results(job_id)?,
            }),
            JobStatus::Processing => {
                let (completed, total) = self.store.request_counts(job_id)?;
                let estimated_completion =
                    estimate_completion(completed, total, &job.started_at, Utc::now())
                        .map(|dt| dt.to_rfc3339());
                Ok(JobReport::Processing {
                    completed,
                    total,
                    started_at: job.started_at,
                    estimated_completion,
                })
            }
        }
    }
}

/// `now + (total - completed) / (completed / elapsed)`: the remaining work
/// at the observed average rate.
fn estimate_completion(
    completed: u64,
    total: u64,
    started_at: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if completed == 0 {
        return None;
    }
    let started = DateTime::parse_from_rfc3339(started_at)
        .ok()?
        .with_timezone(&Utc);
    let elapsed_ms = (now - started).num_milliseconds().max(0) as f64;
    let remaining = total.saturating_sub(completed) as f64;
    let remaining_ms = elapsed_ms * remaining / completed as f64;
    Some(now + chrono::Duration::milliseconds(remaining_ms as i64))
}
