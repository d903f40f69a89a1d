use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{HttpRequestSpec, Job, JobStatus, RateUnit, RequestOutcome, StoredRequest};

/// Thread-safe accessor over one instance's jobs and requests.
///
/// Wraps a single SQLite connection in a `Mutex`. Subsystems that must not
/// contend on the drain loop's queries (admission, status reads) open their
/// own `JobStore` on the same file; WAL mode makes that safe.
pub struct JobStore {
    db: Mutex<Connection>,
}

impl JobStore {
    /// Open (or create) the database file at `path` and initialise the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::new(conn)
    }

    /// Wrap an already-open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Atomically insert one job row plus all request rows in submitted
    /// order. All-or-nothing: any failure rolls the whole admission back.
    ///
    /// Fails with [`StoreError::JobExists`] when the id is already taken;
    /// callers check existence first, and the primary key is the backstop for
    /// two racing submissions.
    pub fn create_job(
        &self,
        job_id: &str,
        requests: &[HttpRequestSpec],
        rate_limit: u32,
        rate_unit: RateUnit,
    ) -> Result<Job> {
        let started_at = chrono::Utc::now().to_rfc3339();

        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        tx.execute(
            "INSERT INTO jobs (id, status, rate_limit, rate_unit, last_processed_index, started_at)
             VALUES (?1, 'processing', ?2, ?3, 0, ?4)",
            rusqlite::params![job_id, rate_limit, rate_unit.to_string(), started_at],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::JobExists {
                    id: job_id.to_string(),
                }
            }
            other => StoreError::Database(other),
        })?;

        for spec in requests {
            let headers = spec
                .headers
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            let body = spec.body.as_ref().map(serde_json::to_string).transpose()?;
            tx.execute(
                "INSERT INTO requests (job_id, url, method, headers, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![job_id, spec.url, spec.method, headers, body],
            )?;
        }

        tx.commit()?;
        debug!(job_id, count = requests.len(), "job admitted");

        Ok(Job {
            id: job_id.to_string(),
            status: JobStatus::Processing,
            rate_limit,
            rate_unit,
            last_processed_index: 0,
            started_at,
        })
    }

    /// Fetch a job by id, returning `None` if it does not exist.
    pub fn job(&self, job_id: &str) -> Result<Option<Job>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, status, rate_limit, rate_unit, last_processed_index, started_at
             FROM jobs WHERE id = ?1",
            [job_id],
            row_to_job,
        ) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn job_exists(&self, job_id: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM jobs WHERE id = ?1",
            [job_id],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// The oldest job still in `processing`, or `None` when the queue is
    /// drained. Rowid breaks ties between same-timestamp admissions.
    pub fn next_queued_job(&self) -> Result<Option<Job>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, status, rate_limit, rate_unit, last_processed_index, started_at
             FROM jobs WHERE status = 'processing'
             ORDER BY started_at, rowid LIMIT 1",
            [],
            row_to_job,
        ) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Unresolved requests of a job in submission order.
    ///
    /// Re-queryable: rows gain `status` or `error` as they resolve and drop
    /// out, which is the entire resumption protocol: a drain re-entered
    /// after a crash only ever sees work still pending.
    pub fn pending_requests(&self, job_id: &str) -> Result<Vec<StoredRequest>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached(
            "SELECT id, job_id, url, method, headers, body,
                    status, response_data, error, processed_at
             FROM requests
             WHERE job_id = ?1 AND status IS NULL AND error IS NULL
             ORDER BY id",
        )?;
        let rows = stmt.query_map([job_id], row_to_request)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Record the terminal outcome of one request.
    ///
    /// Guarded point update: the WHERE clause only matches a still-pending
    /// row, so a second write (e.g. a drain resumed around an in-flight
    /// step) is a logged no-op and a request is never retried once resolved.
    pub fn record_outcome(
        &self,
        request_id: i64,
        outcome: &RequestOutcome,
        processed_at: &str,
    ) -> Result<()> {
        let (status, response_data, error) = match outcome {
            RequestOutcome::Responded {
                status,
                response_data,
            } => (
                Some(*status as i64),
                response_data.as_ref().map(serde_json::to_string).transpose()?,
                None,
            ),
            RequestOutcome::Failed { error } => (None, None, Some(error.clone())),
        };

        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE requests
             SET status = ?1, response_data = ?2, error = ?3, processed_at = ?4
             WHERE id = ?5 AND status IS NULL AND error IS NULL",
            rusqlite::params![status, response_data, error, processed_at, request_id],
        )?;
        if rows_changed == 0 {
            warn!(request_id, "outcome already recorded, write skipped");
        }
        Ok(())
    }

    /// Bump the display-only progress counter.
    pub fn advance_progress(&self, job_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE jobs SET last_processed_index = last_processed_index + 1 WHERE id = ?1",
            [job_id],
        )?;
        if rows_changed == 0 {
            return Err(StoreError::JobNotFound {
                id: job_id.to_string(),
            });
        }
        Ok(())
    }

    /// Mark a job `complete`. Irreversible: the guard means a repeat call
    /// (or a call racing a completed job) changes nothing.
    pub fn complete_job(&self, job_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE jobs SET status = 'complete' WHERE id = ?1 AND status = 'processing'",
            [job_id],
        )?;
        if rows_changed == 0 {
            let exists: i64 = db.query_row(
                "SELECT COUNT(*) FROM jobs WHERE id = ?1",
                [job_id],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(StoreError::JobNotFound {
                    id: job_id.to_string(),
                });
            }
            warn!(job_id, "complete_job on already-complete job, no-op");
        }
        Ok(())
    }

    /// `(completed, total)` request counts for status reporting.
    /// Completed = rows with a recorded status or error.
    pub fn request_counts(&self, job_id: &str) -> Result<(u64, u64)> {
        let db = self.db.lock().unwrap();
        let (completed, total): (i64, i64) = db.query_row(
            "SELECT COALESCE(SUM(CASE WHEN status IS NOT NULL OR error IS NOT NULL
                                      THEN 1 ELSE 0 END), 0),
                    COUNT(*)
             FROM requests WHERE job_id = ?1",
            [job_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((completed as u64, total as u64))
    }

    /// Every request of a job, resolved or not, in submission order.
    pub fn results(&self, job_id: &str) -> Result<Vec<StoredRequest>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached(
            "SELECT id, job_id, url, method, headers, body,
                    status, response_data, error, processed_at
             FROM requests WHERE job_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([job_id], row_to_request)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

/// Map a SQLite row to a `Job`.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let status_str: String = row.get(1)?;
    let unit_str: String = row.get(3)?;
    Ok(Job {
        id: row.get(0)?,
        status: status_str.parse().unwrap_or(JobStatus::Processing),
        rate_limit: row.get::<_, i64>(2)? as u32,
        rate_unit: unit_str.parse().unwrap_or(RateUnit::Hour),
        last_processed_index: row.get::<_, i64>(4)? as u64,
        started_at: row.get(5)?,
    })
}

/// Map a SQLite row to a `StoredRequest`.
fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRequest> {
    let headers: Option<String> = row.get(4)?;
    let body: Option<String> = row.get(5)?;
    let response_data: Option<String> = row.get(7)?;
    Ok(StoredRequest {
        id: row.get(0)?,
        job_id: row.get(1)?,
        spec: HttpRequestSpec {
            url: row.get(2)?,
            method: row.get(3)?,
            headers: headers.and_then(|h| serde_json::from_str(&h).ok()),
            body: body.and_then(|b| serde_json::from_str(&b).ok()),
        },
        status: row.get::<_, Option<i64>>(6)?.map(|s| s as u16),
        response_data: response_data.and_then(|d| serde_json::from_str(&d).ok()),
        error: row.get(8)?,
        processed_at: row.get(9)?,
    })
}
