//! Run history persisted in SQLite
//!
//! Completed run artifacts are stored as zstd-compressed JSON next to a few
//! summary columns for listing. The store keeps the newest `limit` entries
//! and skips a save when the same query in the same mode was recorded
//! within the dedup window.

use crate::config::{expand_tilde, Config};
use crate::error::{Result, ScopeError};
use crate::model::{RunArtifact, SearchMode};
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// zstd level for stored artifacts
const COMPRESSION_LEVEL: i32 = 3;

/// File name of the history database inside the data directory
pub const HISTORY_FILE: &str = "history.sqlite";

/// One row of `history list`
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub mode: SearchMode,
    pub query: Option<String>,
    pub ai_enabled: bool,
    pub places_count: usize,
    pub reviews_count: usize,
}

/// Persistent, capped list of past run artifacts
pub struct HistoryStore {
    pool: DbPool,
    limit: usize,
    dedup_window: Duration,
}

impl HistoryStore {
    /// Open (creating if needed) the store at `db_path`
    pub fn open(db_path: &Path, limit: usize, dedup_window: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ScopeError::Io {
                source: e,
                context: format!("Failed to create history directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| ScopeError::Config(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| ScopeError::Config(format!("Failed to get connection: {}", e)))?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let store = Self {
            pool,
            limit: limit.max(1),
            dedup_window,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open the store configured in `[storage]`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(
            &Self::default_path(config)?,
            config.storage.history_limit,
            config.history_dedup_window(),
        )
    }

    pub fn default_path(config: &Config) -> Result<PathBuf> {
        Ok(expand_tilde(&config.storage.data_dir)?.join(HISTORY_FILE))
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| ScopeError::Config(format!("Failed to get connection: {}", e)))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                info!("Applying history migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Record a completed run; returns false when it was a duplicate
    pub fn save(&self, artifact: &RunArtifact) -> Result<bool> {
        self.save_at(artifact, Utc::now())
    }

    /// [`HistoryStore::save`] with an explicit clock reading
    pub fn save_at(&self, artifact: &RunArtifact, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.get_conn()?;
        let now_ms = now.timestamp_millis();
        let window_start = now_ms - self.dedup_window.as_millis() as i64;

        let duplicates: i64 = conn.query_row(
            "SELECT COUNT(*) FROM runs
             WHERE mode = ?1 AND query IS ?2 AND saved_at > ?3",
            params![artifact.mode.as_str(), artifact.query, window_start],
            |row| row.get(0),
        )?;
        if duplicates > 0 {
            debug!(
                mode = artifact.mode.as_str(),
                query = ?artifact.query,
                "Duplicate run within dedup window, not saving"
            );
            return Ok(false);
        }

        let json = serde_json::to_vec(artifact).map_err(|e| ScopeError::Json {
            source: e,
            context: "Failed to serialize run artifact".to_string(),
        })?;
        let compressed =
            zstd::encode_all(&json[..], COMPRESSION_LEVEL).map_err(|e| ScopeError::Io {
                source: e,
                context: "Failed to compress run artifact".to_string(),
            })?;

        conn.execute(
            "INSERT OR REPLACE INTO runs
                (id, saved_at, mode, query, ai_enabled, places_count, reviews_count, artifact)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                artifact.run_id.to_string(),
                now_ms,
                artifact.mode.as_str(),
                artifact.query,
                artifact.ai_enabled,
                artifact.places.len() as i64,
                artifact.aggregate_stats.total_reviews as i64,
                compressed,
            ],
        )?;

        let pruned = conn.execute(
            "DELETE FROM runs WHERE id NOT IN
                (SELECT id FROM runs ORDER BY saved_at DESC LIMIT ?1)",
            params![self.limit as i64],
        )?;

        info!(
            run_id = %artifact.run_id,
            bytes = compressed.len(),
            pruned,
            "Saved run to history"
        );
        Ok(true)
    }

    /// Summaries, newest first
    pub fn list(&self) -> Result<Vec<HistorySummary>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, saved_at, mode, query, ai_enabled, places_count, reviews_count
             FROM runs ORDER BY saved_at DESC",
        )?;

        let rows = stmt
            .query_map([], read_summary_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    /// Full artifact of a saved run
    pub fn get(&self, id: &Uuid) -> Result<Option<RunArtifact>> {
        let conn = self.get_conn()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT artifact FROM runs WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(blob) = blob else {
            return Ok(None);
        };

        let json = zstd::decode_all(&blob[..]).map_err(|e| ScopeError::Io {
            source: e,
            context: format!("Failed to decompress history entry {}", id),
        })?;
        let artifact = serde_json::from_slice(&json).map_err(|e| ScopeError::Json {
            source: e,
            context: format!("Failed to parse history entry {}", id),
        })?;
        Ok(Some(artifact))
    }

    /// Remove one entry; returns false when it did not exist
    pub fn delete(&self, id: &Uuid) -> Result<bool> {
        let conn = self.get_conn()?;
        let removed = conn.execute("DELETE FROM runs WHERE id = ?1", params![id.to_string()])?;
        Ok(removed > 0)
    }

    /// Remove every entry; returns how many were removed
    pub fn clear(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM runs", [])?)
    }
}

/// Raw column values, validated outside the rusqlite row callback
struct SummaryRow {
    id: String,
    saved_at: i64,
    mode: String,
    query: Option<String>,
    ai_enabled: bool,
    places_count: i64,
    reviews_count: i64,
}

fn read_summary_row(row: &Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok(SummaryRow {
        id: row.get(0)?,
        saved_at: row.get(1)?,
        mode: row.get(2)?,
        query: row.get(3)?,
        ai_enabled: row.get(4)?,
        places_count: row.get(5)?,
        reviews_count: row.get(6)?,
    })
}

impl SummaryRow {
    fn into_summary(self) -> Result<HistorySummary> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| anyhow::anyhow!("Corrupt history id '{}': {}", self.id, e))?;
        let saved_at = DateTime::<Utc>::from_timestamp_millis(self.saved_at)
            .ok_or_else(|| anyhow::anyhow!("Corrupt history timestamp {}", self.saved_at))?;
        let mode = match self.mode.as_str() {
            "brand" => SearchMode::Brand,
            "url" => SearchMode::Url,
            other => return Err(anyhow::anyhow!("Unknown history mode '{}'", other).into()),
        };

        Ok(HistorySummary {
            id,
            saved_at,
            mode,
            query: self.query,
            ai_enabled: self.ai_enabled,
            places_count: self.places_count.max(0) as usize,
            reviews_count: self.reviews_count.max(0) as usize,
        })
    }
}

/// History schema migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: run artifacts
    r#"
    CREATE TABLE runs (
        id TEXT PRIMARY KEY,
        saved_at INTEGER NOT NULL,
        mode TEXT NOT NULL,
        query TEXT,
        ai_enabled BOOLEAN NOT NULL,
        places_count INTEGER NOT NULL,
        reviews_count INTEGER NOT NULL,
        artifact BLOB NOT NULL
    );

    CREATE INDEX idx_runs_saved_at ON runs(saved_at);
    CREATE INDEX idx_runs_mode_query ON runs(mode, query);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AggregateStats;
    use tempfile::TempDir;

    fn artifact(mode: SearchMode, query: Option<&str>) -> RunArtifact {
        RunArtifact {
            run_id: Uuid::new_v4(),
            mode,
            query: query.map(str::to_string),
            ai_enabled: false,
            completed_at: Utc::now(),
            places: Vec::new(),
            aggregate_stats: AggregateStats::default(),
        }
    }

    fn store(temp: &TempDir, limit: usize) -> HistoryStore {
        HistoryStore::open(
            &temp.path().join("history.sqlite"),
            limit,
            Duration::from_secs(60),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.sqlite");
        HistoryStore::open(&path, 20, Duration::from_secs(60)).unwrap();
        HistoryStore::open(&path, 20, Duration::from_secs(60)).unwrap();
    }

    #[test]
    fn test_dedup_window() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 20);
        let t0 = Utc::now();

        assert!(store.save_at(&artifact(SearchMode::Brand, Some("Nero")), t0).unwrap());
        // Same brand within a minute
        let t1 = t0 + chrono::Duration::seconds(30);
        assert!(!store.save_at(&artifact(SearchMode::Brand, Some("Nero")), t1).unwrap());
        // Different brand
        assert!(store.save_at(&artifact(SearchMode::Brand, Some("Rosso")), t1).unwrap());
        // Same brand after the window
        let t2 = t0 + chrono::Duration::seconds(61);
        assert!(store.save_at(&artifact(SearchMode::Brand, Some("Nero")), t2).unwrap());

        // URL runs have no query: any URL run inside the window is a duplicate
        assert!(store.save_at(&artifact(SearchMode::Url, None), t2).unwrap());
        assert!(!store.save_at(&artifact(SearchMode::Url, None), t2).unwrap());

        assert_eq!(store.list().unwrap().len(), 4);
    }

    #[test]
    fn test_limit_keeps_newest() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 3);
        let t0 = Utc::now();

        for i in 0..5 {
            let query = format!("brand-{}", i);
            let at = t0 + chrono::Duration::seconds(i);
            store
                .save_at(&artifact(SearchMode::Brand, Some(&query)), at)
                .unwrap();
        }

        let list = store.list().unwrap();
        let queries: Vec<&str> = list.iter().filter_map(|s| s.query.as_deref()).collect();
        assert_eq!(queries, vec!["brand-4", "brand-3", "brand-2"]);
    }

    #[test]
    fn test_get_delete_clear() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 20);
        let run = artifact(SearchMode::Brand, Some("Nero"));
        store.save(&run).unwrap();

        let loaded = store.get(&run.run_id).unwrap().unwrap();
        assert_eq!(loaded, run);
        assert!(store.get(&Uuid::new_v4()).unwrap().is_none());

        assert!(store.delete(&run.run_id).unwrap());
        assert!(!store.delete(&run.run_id).unwrap());

        store.save(&artifact(SearchMode::Url, None)).unwrap();
        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.list().unwrap().is_empty());
    }
}
