use rusqlite::Connection;

use crate::error::Result;

/// Initialise the job store schema in `conn`.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout. The
/// `requests.id` AUTOINCREMENT column doubles as the per-job submission
/// order because admission inserts all rows inside one transaction.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id                    TEXT    NOT NULL PRIMARY KEY,
            status                TEXT    NOT NULL DEFAULT 'processing',
            rate_limit            INTEGER NOT NULL,
            rate_unit             TEXT    NOT NULL,
            last_processed_index  INTEGER NOT NULL DEFAULT 0,
            started_at            TEXT    NOT NULL   -- ISO-8601
        ) STRICT;

        -- Queue pickup: SELECT … WHERE status = 'processing' ORDER BY started_at
        CREATE INDEX IF NOT EXISTS idx_jobs_queue ON jobs (status, started_at);

        CREATE TABLE IF NOT EXISTS requests (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id        TEXT    NOT NULL REFERENCES jobs(id),
            url           TEXT    NOT NULL,
            method        TEXT    NOT NULL,
            headers       TEXT,               -- JSON object or NULL
            body          TEXT,               -- opaque serialized payload or NULL
            status        INTEGER,            -- HTTP status, NULL until attempted
            response_data TEXT,               -- decoded payload or NULL
            error         TEXT,               -- failure description or NULL
            processed_at  TEXT                -- ISO-8601 or NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_requests_job ON requests (job_id, id);
        ",
    )?;
    Ok(())
}
