use drip_store::{HttpRequestSpec, JobStore, RateUnit, StoreError};
use serde::Deserialize;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Fallback rate when a submission names no options.
pub const DEFAULT_RATE_LIMIT: u32 = 5_000;
pub const DEFAULT_RATE_UNIT: RateUnit = RateUnit::Hour;

/// Rate options accepted alongside a submission.
///
/// Deliberately loosely typed: validation (positive limit, recognized
/// unit) happens here with descriptive messages instead of failing deep in
/// deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOptions {
    pub rate_limit: Option<i64>,
    pub unit: Option<String>,
}

/// Outcome of a successful `schedule` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub job_id: String,
    /// True when the job already existed; nothing was modified and the
    /// caller should poll status instead.
    pub resuming: bool,
}

/// Validates a submission and atomically persists it, then nudges the
/// engine. The only component that creates jobs.
pub struct AdmissionGate {
    store: JobStore,
    engine: Engine,
}

impl AdmissionGate {
    pub fn new(store: JobStore, engine: Engine) -> Self {
        Self { store, engine }
    }

    /// Admit a named batch of requests.
    ///
    /// Rejected with [`EngineError::Validation`] before any state mutation
    /// when the batch is empty, an entry lacks url/method, the rate limit
    /// is not a positive integer, or the unit is unrecognized. A duplicate
    /// id returns `resuming: true` without touching the store.
    pub fn schedule(
        &self,
        job_id: &str,
        requests: Vec<HttpRequestSpec>,
        options: Option<SubmitOptions>,
    ) -> Result<Admitted> {
        if job_id.is_empty() {
            return Err(EngineError::Validation(
                "clientId must not be empty".to_string(),
            ));
        }
        if requests.is_empty() {
            return Err(EngineError::Validation(
                "requests must not be empty".to_string(),
            ));
        }
        for (i, spec) in requests.iter().enumerate() {
            if spec.url.is_empty() {
                return Err(EngineError::Validation(format!(
                    "request {i} is missing a url"
                )));
            }
            if spec.method.is_empty() {
                return Err(EngineError::Validation(format!(
                    "request {i} is missing a method"
                )));
            }
        }

        let options = options.unwrap_or_default();
        let rate_limit = match options.rate_limit {
            None => DEFAULT_RATE_LIMIT,
            Some(rl) if rl >= 1 && rl <= u32::MAX as i64 => rl as u32,
            Some(_) => {
                return Err(EngineError::Validation(
                    "rateLimit must be a positive integer".to_string(),
                ))
            }
        };
        let rate_unit = match options.unit.as_deref() {
            None => DEFAULT_RATE_UNIT,
            Some(raw) => raw.parse::<RateUnit>().map_err(|_| {
                EngineError::Validation("unit must be one of second, minute, hour".to_string())
            })?,
        };

        if self.store.job_exists(job_id)? {
            info!(job_id, "duplicate submission, nothing to do");
            return Ok(Admitted {
                job_id: job_id.to_string(),
                resuming: true,
            });
        }

        match self
            .store
            .create_job(job_id, &requests, rate_limit, rate_unit)
        {
            Ok(_) => {}
            // Two racing submissions of the same id: the primary key is the
            // backstop, the loser gets the same duplicate answer.
            Err(StoreError::JobExists { .. }) => {
                warn!(job_id, "submission lost admission race, treating as duplicate");
                return Ok(Admitted {
                    job_id: job_id.to_string(),
                    resuming: true,
                });
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            job_id,
            count = requests.len(),
            rate_limit,
            rate_unit = %rate_unit,
            "job admitted"
        );
        self.engine.trigger();

        Ok(Admitted {
            job_id: job_id.to_string(),
            resuming: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drip_core::config::EngineConfig;
    use drip_store::JobStatus;
    use crate::timer::WakeTimer;

    fn open_gate(dir: &tempfile::TempDir) -> (AdmissionGate, JobStore) {
        let path = dir.path().join("instance.db");
        let engine = Engine::new(
            JobStore::open(&path).unwrap(),
            WakeTimer::open(&path).unwrap(),
            &EngineConfig::default(),
        )
        .unwrap();
        let gate = AdmissionGate::new(JobStore::open(&path).unwrap(), engine);
        let store = JobStore::open(&path).unwrap();
        (gate, store)
    }

    fn get_spec(url: &str) -> HttpRequestSpec {
        HttpRequestSpec {
            url: url.to_string(),
            method: "GET".to_string(),
            headers: None,
            body: None,
        }
    }

    #[tokio::test]
    async fn empty_requests_fail_validation_without_state_change() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, store) = open_gate(&dir);

        let err = gate.schedule("j1", vec![], None).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(!store.job_exists("j1").unwrap());
    }

    #[tokio::test]
    async fn entry_without_url_or_method_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, store) = open_gate(&dir);

        let mut missing_url = get_spec("");
        missing_url.method = "GET".to_string();
        assert!(matches!(
            gate.schedule("j1", vec![missing_url], None).unwrap_err(),
            EngineError::Validation(_)
        ));

        let mut missing_method = get_spec("https://x/a");
        missing_method.method = String::new();
        assert!(matches!(
            gate.schedule("j1", vec![missing_method], None).unwrap_err(),
            EngineError::Validation(_)
        ));

        assert!(!store.job_exists("j1").unwrap());
    }

    #[tokio::test]
    async fn non_positive_rate_limit_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, store) = open_gate(&dir);

        for bad in [-1, 0] {
            let err = gate
                .schedule(
                    "j1",
                    vec![get_spec("https://x/a")],
                    Some(SubmitOptions {
                        rate_limit: Some(bad),
                        unit: Some("minute".to_string()),
                    }),
                )
                .unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        }
        assert!(!store.job_exists("j1").unwrap());
    }

    #[tokio::test]
    async fn unknown_unit_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, store) = open_gate(&dir);

        let err = gate
            .schedule(
                "j1",
                vec![get_spec("https://x/a")],
                Some(SubmitOptions {
                    rate_limit: Some(10),
                    unit: Some("fortnight".to_string()),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(!store.job_exists("j1").unwrap());
    }

    #[tokio::test]
    async fn missing_options_use_the_documented_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, store) = open_gate(&dir);

        let admitted = gate
            .schedule("j1", vec![get_spec("https://x/a")], None)
            .unwrap();
        assert!(!admitted.resuming);

        let job = store.job("j1").unwrap().unwrap();
        assert_eq!(job.rate_limit, DEFAULT_RATE_LIMIT);
        assert_eq!(job.rate_unit, DEFAULT_RATE_UNIT);
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn duplicate_submission_resumes_without_duplicating_rows() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, store) = open_gate(&dir);

        let first = gate
            .schedule(
                "j1",
                vec![get_spec("https://x/a"), get_spec("https://x/b")],
                None,
            )
            .unwrap();
        assert!(!first.resuming);

        let second = gate
            .schedule("j1", vec![get_spec("https://x/other")], None)
            .unwrap();
        assert!(second.resuming);

        let (_, total) = store.request_counts("j1").unwrap();
        assert_eq!(total, 2);
        // the duplicate's payload was not applied
        assert!(store
            .results("j1")
            .unwrap()
            .iter()
            .all(|r| r.spec.url != "https://x/other"));
    }
}
