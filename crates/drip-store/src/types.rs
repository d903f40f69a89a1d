use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The unit a job's rate limit is expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateUnit {
    Second,
    Minute,
    Hour,
}

impl RateUnit {
    /// Length of this unit's window in milliseconds.
    pub fn millis(&self) -> u64 {
        match self {
            RateUnit::Second => 1_000,
            RateUnit::Minute => 60_000,
            RateUnit::Hour => 3_600_000,
        }
    }
}

impl std::fmt::Display for RateUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RateUnit::Second => "second",
            RateUnit::Minute => "minute",
            RateUnit::Hour => "hour",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RateUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "second" => Ok(RateUnit::Second),
            "minute" => Ok(RateUnit::Minute),
            "hour" => Ok(RateUnit::Hour),
            other => Err(format!("unknown rate unit: {other}")),
        }
    }
}

/// Spacing between consecutive dispatches for `rate_limit` requests per unit.
///
/// Rounds up, so the configured limit is never exceeded.
pub fn dispatch_delay(rate_limit: u32, unit: RateUnit) -> Duration {
    Duration::from_millis(unit.millis().div_ceil(rate_limit.max(1) as u64))
}

/// Lifecycle state of a job. Monotonic: `processing` → `complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admitted; queued for, or currently under, execution.
    Processing,
    /// Every request carries a terminal outcome. Never reverses.
    Complete,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "processing" => Ok(JobStatus::Processing),
            "complete" => Ok(JobStatus::Complete),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Caller-supplied name — primary key within one engine instance.
    pub id: String,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Positive number of requests allowed per `rate_unit`.
    pub rate_limit: u32,
    pub rate_unit: RateUnit,
    /// Display-only progress counter. Never consulted for resumption.
    pub last_processed_index: u64,
    /// ISO-8601 timestamp of admission; drain order is oldest-first on this.
    pub started_at: String,
}

impl Job {
    /// Inter-request spacing this job's rate limit demands.
    pub fn delay(&self) -> Duration {
        dispatch_delay(self.rate_limit, self.rate_unit)
    }
}

/// The caller-provided description of one outbound HTTP call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestSpec {
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Terminal result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// The target answered. Non-2xx answers carry no decoded body.
    Responded {
        status: u16,
        response_data: Option<serde_json::Value>,
    },
    /// Transport or decode failure before a numeric status existed.
    Failed { error: String },
}

/// A persisted request row, including any recorded outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRequest {
    /// AUTOINCREMENT id — also the submission order within the job.
    pub id: i64,
    pub job_id: String,
    #[serde(flatten)]
    pub spec: HttpRequestSpec,
    /// Numeric HTTP status; NULL until attempted or on transport failure.
    pub status: Option<u16>,
    pub response_data: Option<serde_json::Value>,
    pub error: Option<String>,
    /// ISO-8601 timestamp of the dispatch attempt, NULL until attempted.
    pub processed_at: Option<String>,
}

impl StoredRequest {
    /// Pending ⇔ neither `status` nor `error` is set.
    pub fn is_pending(&self) -> bool {
        self.status.is_none() && self.error.is_none()
    }
}
