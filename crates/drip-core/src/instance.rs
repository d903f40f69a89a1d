use serde::{Deserialize, Serialize};

use crate::error::{DripError, Result};

/// Maximum accepted key length. Keys become file names, so keep them short.
const MAX_KEY_LEN: usize = 64;

/// Explicit addressing key for one isolated engine instance.
///
/// The front door maps an authenticated caller to a stable routing token;
/// drip treats that token as the partition key. Every key owns its own
/// SQLite file, its own wake timer, and its own drain loop; two distinct
/// keys never share store state, so no cross-instance locking exists
/// anywhere in the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceKey(String);

impl InstanceKey {
    /// Validate and wrap a raw routing token.
    ///
    /// Accepts 1–64 chars from `[A-Za-z0-9._-]`, not starting with a dot.
    /// The restriction is what makes `db_file_name` safe to join onto the
    /// data directory.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(DripError::InvalidInstanceKey(
                "key must not be empty".to_string(),
            ));
        }
        if raw.len() > MAX_KEY_LEN {
            return Err(DripError::InvalidInstanceKey(format!(
                "key exceeds {MAX_KEY_LEN} characters"
            )));
        }
        if raw.starts_with('.') {
            return Err(DripError::InvalidInstanceKey(
                "key must not start with a dot".to_string(),
            ));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(DripError::InvalidInstanceKey(format!(
                "illegal character {bad:?} in key"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of this instance's SQLite database.
    pub fn db_file_name(&self) -> String {
        format!("{}.db", self.0)
    }

    /// Recover a key from a database file name found in the data directory.
    ///
    /// Returns `None` for files that are not `<key>.db` or whose stem fails
    /// validation (e.g. SQLite `-wal` / `-shm` side files).
    pub fn from_db_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".db")?;
        Self::parse(stem).ok()
    }
}

impl Default for InstanceKey {
    /// The instance callers land on when the front door sets no routing
    /// token (single-tenant deployments).
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl std::fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_tokens() {
        for raw in ["default", "tenant-42", "acme.prod", "A_b-c.9"] {
            assert!(InstanceKey::parse(raw).is_ok(), "rejected {raw}");
        }
    }

    #[test]
    fn rejects_path_hostile_tokens() {
        for raw in ["", "../escape", "a/b", "a\\b", ".hidden", "sp ace"] {
            assert!(InstanceKey::parse(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn rejects_overlong_key() {
        let raw = "x".repeat(65);
        assert!(InstanceKey::parse(&raw).is_err());
    }

    #[test]
    fn db_file_name_roundtrip() {
        let key = InstanceKey::parse("tenant-42").unwrap();
        assert_eq!(key.db_file_name(), "tenant-42.db");
        let back = InstanceKey::from_db_file_name("tenant-42.db").unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn side_files_are_ignored() {
        assert!(InstanceKey::from_db_file_name("tenant-42.db-wal").is_none());
        assert!(InstanceKey::from_db_file_name("tenant-42.db-shm").is_none());
        assert!(InstanceKey::from_db_file_name("notadb.txt").is_none());
    }
}
