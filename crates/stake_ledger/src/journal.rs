//! SQLite journal of committed ledger events.

use crate::events::{EventKind, LedgerEvent};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only event store. Sequence numbers are the primary key, so replays are idempotent.
pub struct EventJournal {
    conn: Mutex<Connection>,
}

impl EventJournal {
    /// Open or create journal at `path`. Creates parent dirs if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, JournalError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, JournalError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY,
                ts INTEGER NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                recorded_utc INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, JournalError> {
        self.conn
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()).into())
    }

    /// Append events in one transaction. Already-recorded sequence numbers are skipped.
    pub fn append(&self, events: &[LedgerEvent]) -> Result<usize, JournalError> {
        let recorded = time::OffsetDateTime::now_utc().unix_timestamp();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO events (seq, ts, kind, payload, recorded_utc) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for ev in events {
                let payload = serde_json::to_string(&ev.kind)?;
                inserted += stmt.execute(rusqlite::params![
                    ev.seq as i64,
                    ev.timestamp as i64,
                    ev.kind.name(),
                    payload,
                    recorded
                ])?;
            }
        }
        tx.commit()?;
        debug!(inserted, "journal append");
        Ok(inserted)
    }

    pub fn count(&self) -> Result<u64, JournalError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn is_empty(&self) -> Result<bool, JournalError> {
        Ok(self.count()? == 0)
    }

    pub fn last_seq(&self) -> Result<Option<u64>, JournalError> {
        let conn = self.lock()?;
        let seq: Option<i64> = conn
            .query_row(
                "SELECT seq FROM events ORDER BY seq DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?;
        Ok(seq.map(|s| s as u64))
    }

    /// All events in sequence order.
    pub fn events(&self) -> Result<Vec<LedgerEvent>, JournalError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT seq, ts, payload FROM events ORDER BY seq")?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (seq, ts, payload) = row?;
            let kind: EventKind = serde_json::from_str(&payload)?;
            out.push(LedgerEvent {
                seq: seq as u64,
                timestamp: ts as u64,
                kind,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, AssetId, PRECISION_FACTOR};
    use tempfile::NamedTempFile;

    fn sample() -> Vec<LedgerEvent> {
        vec![
            LedgerEvent {
                seq: 0,
                timestamp: 5,
                kind: EventKind::AssetIndexUpdated {
                    asset: AssetId::from_low_u64(1),
                    index: PRECISION_FACTOR * 1_000_000,
                },
            },
            LedgerEvent {
                seq: 1,
                timestamp: 5,
                kind: EventKind::CooldownStarted {
                    account: AccountId::from_low_u64(2),
                },
            },
        ]
    }

    #[test]
    fn append_and_read_back() {
        let tmp = NamedTempFile::new().unwrap();
        let j = EventJournal::open(tmp.path()).unwrap();
        assert!(j.is_empty().unwrap());
        assert_eq!(j.append(&sample()).unwrap(), 2);
        assert_eq!(j.events().unwrap(), sample());
        assert_eq!(j.last_seq().unwrap(), Some(1));
    }

    #[test]
    fn reappend_is_idempotent() {
        let j = EventJournal::in_memory().unwrap();
        j.append(&sample()).unwrap();
        assert_eq!(j.append(&sample()).unwrap(), 0);
        assert_eq!(j.count().unwrap(), 2);
    }

    #[test]
    fn survives_reopen() {
        let tmp = NamedTempFile::new().unwrap();
        EventJournal::open(tmp.path())
            .unwrap()
            .append(&sample())
            .unwrap();
        let j = EventJournal::open(tmp.path()).unwrap();
        assert_eq!(j.count().unwrap(), 2);
    }
}
