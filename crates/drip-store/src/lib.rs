//! `drip-store` — SQLite-backed persistence for jobs and their requests.
//!
//! # Overview
//!
//! A job is a named batch of outbound HTTP request descriptions admitted in
//! one transaction. The [`store::JobStore`] exposes the accessors the drain
//! loop and the status reporter build on:
//!
//! | Operation          | Behaviour                                          |
//! |--------------------|----------------------------------------------------|
//! | `create_job`       | All-or-nothing insert of job + ordered requests    |
//! | `next_queued_job`  | Oldest `processing` job by `started_at`            |
//! | `pending_requests` | Unresolved requests in submission order            |
//! | `record_outcome`   | One terminal outcome write per request, guarded    |
//! | `advance_progress` | Display-only counter bump                          |
//! | `complete_job`     | `processing` → `complete`, irreversible            |
//!
//! Resumption after a crash relies on `pending_requests` alone: resolved
//! rows drop out of the query, so re-running a drain never repeats work.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::JobStore;
pub use types::{
    dispatch_delay, HttpRequestSpec, Job, JobStatus, RateUnit, RequestOutcome, StoredRequest,
};
