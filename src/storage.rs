use crate::api::models::Match;
use crate::error::Result;
use rusqlite::{Connection, params};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Last refreshed match list, kept so a restored session can draw its
/// conversation list before the first refresh answers.
pub struct MatchCache {
    conn: Connection,
}

impl MatchCache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                raw_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Replace the cached list with `matches`, keeping server order.
    pub fn store(&mut self, matches: &[Match]) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM matches", [])?;
        for (idx, m) in matches.iter().enumerate() {
            let raw = serde_json::to_string(m)?;
            // a repeated id within one snapshot keeps its last position
            tx.execute(
                "INSERT OR REPLACE INTO matches (id, position, updated_at, raw_json) VALUES (?1, ?2, ?3, ?4)",
                params![m.id, idx as i64, now, raw],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Rows that no longer decode are skipped.
    pub fn load(&self) -> Result<Vec<Match>> {
        let mut stmt = self.conn.prepare("SELECT raw_json FROM matches ORDER BY position ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for raw in rows {
            match serde_json::from_str::<Match>(&raw?) {
                Ok(m) => out.push(m),
                Err(e) => log::debug!("skipping cached match: {e}"),
            }
        }
        Ok(out)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM matches", [])?;
        Ok(())
    }
}
