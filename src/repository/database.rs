use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, Pool, QueryBuilder, Row, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::model::{Event, EventKind, EventLog, FileEntry, MappingCache, RevisionRecord};

use super::SCHEMA_VERSION;

/// The two persisted documents, each with its own generation marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Document {
    MappingCache,
    EventLog,
}

impl Document {
    fn generation_key(self) -> &'static str {
        match self {
            Document::MappingCache => "generation_mappingscache",
            Document::EventLog => "generation_lastevents",
        }
    }
}

/// A cached revision row for database storage (zero-copy friendly)
#[derive(Debug, Clone)]
pub struct RevisionRow<'a> {
    pub repo: &'a str,
    pub branch: &'a str,
    pub record: &'a RevisionRecord,
}

impl<'a> RevisionRow<'a> {
    pub fn new(repo: &'a str, branch: &'a str, record: &'a RevisionRecord) -> Self {
        Self { repo, branch, record }
    }
}

/// Database abstraction for SQLite operations
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Configure connection options with PRAGMAs applied to every connection
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .pragma("temp_store", "MEMORY")
            .pragma("cache_size", "-64000"); // 64MB cache

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    /// Open the index at `path`, recreating it if SQLite reports it corrupt.
    ///
    /// A recreated index is empty, so the next refresh rebuilds it in full.
    /// Other failures (locks, permissions) are returned with the files left alone.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let path_str = path.to_str().context("Invalid path encoding")?;

        match Self::connect_and_init(path_str).await {
            Ok(db) => Ok(db),
            Err(e) if is_corruption(&e) => {
                warn!(path = %path.display(), error = %e, "index database corrupt, recreating");
                for suffix in ["", "-wal", "-shm"] {
                    let file = format!("{}{}", path_str, suffix);
                    if Path::new(&file).exists() {
                        std::fs::remove_file(&file)
                            .with_context(|| format!("Could not remove {}", file))?;
                    }
                }
                Self::connect_and_init(path_str).await
            }
            Err(e) => Err(e),
        }
    }

    async fn connect_and_init(path: &str) -> Result<Self> {
        let db = Self::new(path).await?;
        db.init_schema().await?;
        Ok(db)
    }

    /// Initialize database schema, returns true if schema was rebuilt
    pub async fn init_schema(&self) -> Result<bool> {
        // Create metadata table first (needed to check version)
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"
        ).execute(&self.pool).await?;

        // Check schema version
        let stored_version: Option<String> = sqlx::query("SELECT value FROM metadata WHERE key = 'schema_version'")
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.get("value"));

        let needs_rebuild = stored_version.as_deref() != Some(SCHEMA_VERSION);

        if needs_rebuild {
            if let Some(stored) = &stored_version {
                info!(from = %stored, to = SCHEMA_VERSION, "schema version changed, rebuilding index");
            }
            sqlx::query("DROP TABLE IF EXISTS revision_entries").execute(&self.pool).await?;
            sqlx::query("DROP TABLE IF EXISTS revisions").execute(&self.pool).await?;
            sqlx::query("DROP TABLE IF EXISTS events").execute(&self.pool).await?;
            sqlx::query("DELETE FROM metadata").execute(&self.pool).await?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS revisions (
                repo TEXT NOT NULL,
                branch TEXT NOT NULL,
                rev INTEGER NOT NULL,
                commit_id TEXT NOT NULL,
                srcmd5 TEXT NOT NULL,
                PRIMARY KEY (repo, branch, rev)
            )"
        ).execute(&self.pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS revision_entries (
                repo TEXT NOT NULL,
                branch TEXT NOT NULL,
                rev INTEGER NOT NULL,
                name TEXT NOT NULL,
                md5 TEXT NOT NULL,
                PRIMARY KEY (repo, branch, rev, name)
            )"
        ).execute(&self.pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                project TEXT NOT NULL,
                package TEXT
            )"
        ).execute(&self.pool).await?;

        // Store current schema version
        if needs_rebuild {
            sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?)")
                .bind(SCHEMA_VERSION)
                .execute(&self.pool)
                .await?;
        }

        Ok(needs_rebuild)
    }

    /// Get metadata value by key
    pub async fn get_metadata(&self, key: &str) -> Option<String> {
        sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .map(|row| row.get("value"))
    }

    /// Set metadata value
    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Generation marker of a document; 0 until it is first published
    pub async fn generation(&self, document: Document) -> Result<i64> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?")
            .bind(document.generation_key())
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// Load the whole mapping cache document
    pub async fn load_mapping_cache(&self) -> Result<MappingCache> {
        let rows = sqlx::query(
            "SELECT repo, branch, rev, commit_id, srcmd5 FROM revisions ORDER BY repo, branch, rev"
        )
        .fetch_all(&self.pool)
        .await?;

        let mut branches: Vec<((String, String), Vec<RevisionRecord>)> = Vec::new();
        let mut index: FxHashMap<(String, String), usize> = FxHashMap::default();
        for row in rows {
            let key = (row.get::<String, _>("repo"), row.get::<String, _>("branch"));
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                branches.push((key, Vec::new()));
                branches.len() - 1
            });
            branches[slot].1.push(RevisionRecord {
                commit: row.get("commit_id"),
                rev: row.get::<i64, _>("rev") as u32,
                srcmd5: row.get("srcmd5"),
                entries: Vec::new(),
            });
        }

        let entry_rows = sqlx::query(
            "SELECT repo, branch, rev, name, md5 FROM revision_entries ORDER BY repo, branch, rev, name"
        )
        .fetch_all(&self.pool)
        .await?;

        for row in entry_rows {
            let key = (row.get::<String, _>("repo"), row.get::<String, _>("branch"));
            let rev = row.get::<i64, _>("rev") as usize;
            let record = index
                .get(&key)
                .and_then(|&slot| branches[slot].1.get_mut(rev.wrapping_sub(1)));
            match record {
                Some(record) => record.entries.push(FileEntry::new(
                    row.get::<String, _>("name"),
                    row.get::<String, _>("md5"),
                )),
                None => warn!(repo = %key.0, branch = %key.1, rev, "orphan revision entry ignored"),
            }
        }

        let mut cache = MappingCache::new();
        for ((repo, branch), records) in branches {
            cache.extend_branch(&repo, &branch, records)?;
        }
        Ok(cache)
    }

    /// Load the whole event log document
    pub async fn load_event_log(&self) -> Result<EventLog> {
        let rows = sqlx::query("SELECT seq, kind, project, package FROM events ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.get("kind");
            let kind = EventKind::parse(&kind)
                .with_context(|| format!("Unknown event kind {:?}", kind))?;
            events.push(Event {
                seq: row.get::<i64, _>("seq") as u64,
                kind,
                project: row.get("project"),
                package: row.get("package"),
            });
        }
        Ok(EventLog::from_events(events))
    }

    /// Publish new revisions and events in ONE transaction.
    ///
    /// Each document whose rows changed gets its generation bumped, which is
    /// what readers poll to notice a new version.
    pub async fn apply_refresh(&self, revisions: &[RevisionRow<'_>], events: &[Event]) -> Result<()> {
        if revisions.is_empty() && events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        if !revisions.is_empty() {
            self.save_revisions_in_tx(&mut tx, revisions).await?;
            self.bump_generation_in_tx(&mut tx, Document::MappingCache).await?;
        }
        if !events.is_empty() {
            self.save_events_in_tx(&mut tx, events).await?;
            self.bump_generation_in_tx(&mut tx, Document::EventLog).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_revisions_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        revisions: &[RevisionRow<'_>],
    ) -> Result<()> {
        const BATCH_SIZE: usize = 5000;

        for chunk in revisions.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO revisions (repo, branch, rev, commit_id, srcmd5) "
            );
            qb.push_values(chunk, |mut row, r| {
                row.push_bind(r.repo)
                    .push_bind(r.branch)
                    .push_bind(r.record.rev as i64)
                    .push_bind(r.record.commit.as_str())
                    .push_bind(r.record.srcmd5.as_str());
            });
            qb.build().execute(&mut **tx).await?;
        }

        let entries: Vec<(&RevisionRow<'_>, &FileEntry)> = revisions
            .iter()
            .flat_map(|r| r.record.entries.iter().map(move |e| (r, e)))
            .collect();

        for chunk in entries.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO revision_entries (repo, branch, rev, name, md5) "
            );
            qb.push_values(chunk, |mut row, (r, e)| {
                row.push_bind(r.repo)
                    .push_bind(r.branch)
                    .push_bind(r.record.rev as i64)
                    .push_bind(e.name.as_str())
                    .push_bind(e.md5.as_str());
            });
            qb.build().execute(&mut **tx).await?;
        }

        Ok(())
    }

    async fn save_events_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        events: &[Event],
    ) -> Result<()> {
        const BATCH_SIZE: usize = 5000;

        for chunk in events.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO events (seq, kind, project, package) "
            );
            qb.push_values(chunk, |mut row, event| {
                row.push_bind(event.seq as i64)
                    .push_bind(event.kind.as_str())
                    .push_bind(event.project.as_str())
                    .push_bind(event.package.as_deref());
            });
            qb.build().execute(&mut **tx).await?;
        }

        Ok(())
    }

    async fn bump_generation_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        document: Document,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO metadata (key, value) VALUES (?, '1') \
             ON CONFLICT(key) DO UPDATE SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)"
        )
        .bind(document.generation_key())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

/// SQLITE_CORRUPT (11) or SQLITE_NOTADB (26), including extended codes
fn is_corruption(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 11 | 26)),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_corruption_is_recreated() {
        let dir = tempfile::tempdir().unwrap();

        let junk = dir.path().join("junk.db");
        std::fs::write(&junk, vec![b'x'; 4096]).unwrap();
        let err = Database::connect_and_init(junk.to_str().unwrap()).await.err().unwrap();
        assert!(is_corruption(&err), "{:#}", err);

        let unreachable = dir.path().join("missing").join("index.db");
        let err = Database::connect_and_init(unreachable.to_str().unwrap()).await.err().unwrap();
        assert!(!is_corruption(&err), "{:#}", err);
    }

    #[tokio::test]
    async fn test_open_keeps_files_on_other_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        assert!(Database::open(&path).await.is_err());
        assert!(path.join("keep").exists());
    }
}
