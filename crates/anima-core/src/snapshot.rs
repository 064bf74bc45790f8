//! Snapshot Store
//!
//! SQLite-backed persistence for the mutable roots: hormone levels,
//! capability Beta parameters, variant states, proposals, change history
//! and memory records. One versioned blob per root; a version mismatch is
//! refused so the caller starts from defaults and logs the migration need.

use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{CoreError, Result};

/// Schema version written with every root blob.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Well-known root names.
pub mod roots {
    /// Hormone levels
    pub const HORMONES: &str = "hormones";
    /// Capability Beta parameters
    pub const CONFIDENCE: &str = "confidence";
    /// Prompt variant states
    pub const VARIANTS: &str = "variants";
    /// Proposals (pending and terminal)
    pub const PROPOSALS: &str = "proposals";
    /// Change history
    pub const CHANGE_HISTORY: &str = "change_history";
    /// Memory records
    pub const MEMORY: &str = "memory";
}

// ============================================================================
// MIGRATIONS
// ============================================================================

/// A store migration.
#[derive(Debug, Clone)]
struct Migration {
    version: u32,
    description: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "snapshot blobs keyed by root",
    up: "CREATE TABLE IF NOT EXISTS snapshots (
             root TEXT PRIMARY KEY,
             schema_version INTEGER NOT NULL,
             produced_at INTEGER NOT NULL,
             body TEXT NOT NULL
         );",
}];

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version INTEGER PRIMARY KEY,
             description TEXT NOT NULL,
             applied_at TEXT NOT NULL
         )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            params![
                migration.version,
                migration.description,
                Utc::now().to_rfc3339()
            ],
        )?;
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "snapshot store migration applied"
        );
    }
    Ok(())
}

// ============================================================================
// STORE
// ============================================================================

/// The snapshot store.
pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `path`; `None` uses the platform data
    /// directory.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(p) => p,
            None => {
                let dirs = ProjectDirs::from("io", "anima", "core").ok_or_else(|| {
                    CoreError::External("could not determine project directories".to_string())
                })?;
                let data_dir = dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("anima.db")
            }
        };

        let conn = Connection::open(&path)?;
        Self::configure_connection(&conn)?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Write one root blob, replacing any previous snapshot of that root.
    pub fn save<T: Serialize>(&self, root: &str, body: &T) -> Result<()> {
        let body = serde_json::to_string(body)?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::External("snapshot store lock poisoned".to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO snapshots (root, schema_version, produced_at, body)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                root,
                SNAPSHOT_SCHEMA_VERSION,
                Utc::now().timestamp_millis(),
                body
            ],
        )?;
        Ok(())
    }

    /// Load one root blob. Returns `Ok(None)` when the root has never been
    /// saved; refuses a schema-version mismatch.
    pub fn load<T: DeserializeOwned>(&self, root: &str) -> Result<Option<T>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::External("snapshot store lock poisoned".to_string()))?;
        let row: Option<(u32, String)> = conn
            .query_row(
                "SELECT schema_version, body FROM snapshots WHERE root = ?1",
                params![root],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((version, _)) if version != SNAPSHOT_SCHEMA_VERSION => {
                Err(CoreError::SchemaMismatch {
                    root: root.to_string(),
                    found: version,
                    expected: SNAPSHOT_SCHEMA_VERSION,
                })
            }
            Some((_, body)) => Ok(Some(serde_json::from_str(&body)?)),
        }
    }

    /// Roots currently stored, sorted.
    pub fn roots(&self) -> Result<Vec<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CoreError::External("snapshot store lock poisoned".to_string()))?;
        let mut stmt = conn.prepare("SELECT root FROM snapshots ORDER BY root")?;
        let roots = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(roots)
    }

    #[cfg(test)]
    pub(crate) fn overwrite_version(&self, root: &str, version: u32) -> Result<()> {
        let conn = self.conn.lock().expect("lock");
        conn.execute(
            "UPDATE snapshots SET schema_version = ?1 WHERE root = ?2",
            params![version, root],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceStore;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        value: u32,
        label: String,
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = SnapshotStore::in_memory().unwrap();
        let blob = Blob {
            value: 7,
            label: "seven".to_string(),
        };
        store.save("test-root", &blob).unwrap();
        let loaded: Blob = store.load("test-root").unwrap().unwrap();
        assert_eq!(loaded, blob);
    }

    #[test]
    fn test_missing_root_is_none() {
        let store = SnapshotStore::in_memory().unwrap();
        let loaded: Option<Blob> = store.load("never-saved").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_replaces_previous() {
        let store = SnapshotStore::in_memory().unwrap();
        store
            .save(
                "root",
                &Blob {
                    value: 1,
                    label: "one".into(),
                },
            )
            .unwrap();
        store
            .save(
                "root",
                &Blob {
                    value: 2,
                    label: "two".into(),
                },
            )
            .unwrap();
        let loaded: Blob = store.load("root").unwrap().unwrap();
        assert_eq!(loaded.value, 2);
        assert_eq!(store.roots().unwrap(), vec!["root".to_string()]);
    }

    #[test]
    fn test_version_mismatch_is_refused() {
        let store = SnapshotStore::in_memory().unwrap();
        store
            .save(
                "root",
                &Blob {
                    value: 1,
                    label: "one".into(),
                },
            )
            .unwrap();
        store.overwrite_version("root", 99).unwrap();

        let err = store.load::<Blob>("root").unwrap_err();
        assert_eq!(err.code(), "schema-mismatch");
    }

    #[test]
    fn test_beta_parameters_survive_round_trip() {
        let store = SnapshotStore::in_memory().unwrap();
        let mut confidence = ConfidenceStore::new();
        confidence.update_batch("x", &[true, true, false]);
        store.save(roots::CONFIDENCE, &confidence.export()).unwrap();

        let pairs = store
            .load::<Vec<(String, crate::confidence::ConfidenceEntry)>>(roots::CONFIDENCE)
            .unwrap()
            .unwrap();
        let mut restored = ConfidenceStore::new();
        restored.restore(pairs);
        assert_eq!(restored.confidence("x"), confidence.confidence("x"));
        assert_eq!(restored.uncertainty("x"), confidence.uncertainty("x"));
        assert_eq!(restored.ucb("x", 2.0), confidence.ucb("x", 2.0));
    }

    #[test]
    fn test_file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.db");
        {
            let store = SnapshotStore::new(Some(path.clone())).unwrap();
            store
                .save(
                    "root",
                    &Blob {
                        value: 9,
                        label: "nine".into(),
                    },
                )
                .unwrap();
        }
        let store = SnapshotStore::new(Some(path)).unwrap();
        let loaded: Blob = store.load("root").unwrap().unwrap();
        assert_eq!(loaded.value, 9);
    }
}
