use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Durable one-shot wake-up timer, at most one pending per instance.
///
/// The single `id = 1` row survives restarts; an armed row found on
/// activation is the signal that a drain was interrupted mid-flight. The
/// engine's watch loop polls [`WakeTimer::pending`] once a second, which is
/// what turns the persisted fire time into an actual callback.
pub struct WakeTimer {
    db: Mutex<Connection>,
}

impl WakeTimer {
    /// Open the timer on the instance's database file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    /// Wrap an already-open connection, initialising the table if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS wake_timer (
                id        INTEGER NOT NULL PRIMARY KEY CHECK (id = 1),
                fire_at   TEXT    NOT NULL,   -- ISO-8601
                armed_at  TEXT    NOT NULL
            ) STRICT;",
        )?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Arm (or re-arm) the timer for `fire_at`. Upsert: there is never
    /// more than one pending timer.
    pub fn arm(&self, fire_at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO wake_timer (id, fire_at, armed_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET fire_at = excluded.fire_at,
                                           armed_at = excluded.armed_at",
            rusqlite::params![fire_at.to_rfc3339(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Disarm the timer. Idempotent.
    pub fn clear(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM wake_timer WHERE id = 1", [])?;
        Ok(())
    }

    /// The pending fire time, if armed.
    pub fn pending(&self) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().unwrap();
        let fire_at: Option<String> = match db.query_row(
            "SELECT fire_at FROM wake_timer WHERE id = 1",
            [],
            |row| row.get(0),
        ) {
            Ok(v) => Some(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };
        match fire_at {
            Some(s) => Ok(Some(DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_clear_pending_roundtrip() {
        let timer = WakeTimer::new(Connection::open_in_memory().unwrap()).unwrap();
        assert!(timer.pending().unwrap().is_none());

        let at = Utc::now() + chrono::Duration::seconds(10);
        timer.arm(at).unwrap();
        let pending = timer.pending().unwrap().unwrap();
        assert!((pending - at).num_milliseconds().abs() < 1_000);

        timer.clear().unwrap();
        assert!(timer.pending().unwrap().is_none());
        // clearing again is fine
        timer.clear().unwrap();
    }

    #[test]
    fn rearming_replaces_the_single_row() {
        let timer = WakeTimer::new(Connection::open_in_memory().unwrap()).unwrap();
        timer.arm(Utc::now() + chrono::Duration::seconds(5)).unwrap();
        let later = Utc::now() + chrono::Duration::seconds(60);
        timer.arm(later).unwrap();
        let pending = timer.pending().unwrap().unwrap();
        assert!((pending - later).num_milliseconds().abs() < 1_000);
    }

    #[test]
    fn armed_timer_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instance.db");

        let at = Utc::now() + chrono::Duration::seconds(30);
        {
            let timer = WakeTimer::open(&path).unwrap();
            timer.arm(at).unwrap();
        }
        // a fresh process would find the armed row
        let timer = WakeTimer::open(&path).unwrap();
        let pending = timer.pending().unwrap().unwrap();
        assert!((pending - at).num_milliseconds().abs() < 1_000);
    }
}
