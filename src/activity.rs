//! Display-event log collaborators.
//!
//! The historical event store is external to the selection core; this crate
//! records one event per shuffle attempt and reads back only "images shown
//! within the last H hours". `SqliteActivityLog` is the default adapter;
//! `MemoryActivityLog` backs tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, params};

use crate::domain::{DisplayEvent, EventOutcome};
use crate::error::Result;

/// Query/record interface over the display-event history
pub trait ActivityLog: Send + Sync {
    /// Record the outcome of one shuffle attempt
    fn record_event(&self, event: &DisplayEvent) -> Result<()>;

    /// Image ids displayed within the last `hours` before `now`.
    /// `device = None` means "on any device". Only successful displays
    /// count; failures and skips do not make an image "recent".
    fn recent_images(
        &self,
        device: Option<&str>,
        hours: u32,
        now: DateTime<Utc>,
    ) -> Result<HashSet<String>>;
}

/// SQLite-backed event log
pub struct SqliteActivityLog {
    conn: Mutex<Connection>,
}

impl SqliteActivityLog {
    /// Open or create the event database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database. Useful for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS display_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL,
                image_id TEXT NOT NULL,
                category TEXT,
                trigger_source TEXT NOT NULL,
                outcome TEXT NOT NULL,
                started_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_device_time
                ON display_events(device_id, started_at);
            CREATE INDEX IF NOT EXISTS idx_events_time
                ON display_events(started_at);
            "#,
        )?;
        Ok(())
    }
}

impl ActivityLog for SqliteActivityLog {
    fn record_event(&self, event: &DisplayEvent) -> Result<()> {
        let conn = self.conn.lock().expect("activity db lock poisoned");
        conn.execute(
            "INSERT INTO display_events \
             (device_id, image_id, category, trigger_source, outcome, started_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.device_id,
                event.image_id,
                event.category,
                event.trigger.as_str(),
                event.outcome.as_str(),
                event.started_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    fn recent_images(
        &self,
        device: Option<&str>,
        hours: u32,
        now: DateTime<Utc>,
    ) -> Result<HashSet<String>> {
        let cutoff = (now - Duration::hours(hours as i64)).timestamp();
        let conn = self.conn.lock().expect("activity db lock poisoned");

        let mut out = HashSet::new();
        match device {
            Some(device_id) => {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT image_id FROM display_events \
                     WHERE outcome = 'displayed' AND started_at >= ?1 AND device_id = ?2",
                )?;
                let rows = stmt.query_map(params![cutoff, device_id], |row| row.get(0))?;
                for row in rows {
                    out.insert(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT image_id FROM display_events \
                     WHERE outcome = 'displayed' AND started_at >= ?1",
                )?;
                let rows = stmt.query_map(params![cutoff], |row| row.get(0))?;
                for row in rows {
                    out.insert(row?);
                }
            }
        }
        Ok(out)
    }
}

/// In-memory event log for tests
#[derive(Default)]
pub struct MemoryActivityLog {
    events: Mutex<Vec<DisplayEvent>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in insertion order
    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events.lock().expect("event lock poisoned").clone()
    }
}

impl ActivityLog for MemoryActivityLog {
    fn record_event(&self, event: &DisplayEvent) -> Result<()> {
        self.events
            .lock()
            .expect("event lock poisoned")
            .push(event.clone());
        Ok(())
    }

    fn recent_images(
        &self,
        device: Option<&str>,
        hours: u32,
        now: DateTime<Utc>,
    ) -> Result<HashSet<String>> {
        let cutoff = now - Duration::hours(hours as i64);
        let events = self.events.lock().expect("event lock poisoned");
        Ok(events
            .iter()
            .filter(|e| e.outcome == EventOutcome::Displayed)
            .filter(|e| e.started_at >= cutoff)
            .filter(|e| device.is_none_or(|d| e.device_id == d))
            .map(|e| e.image_id.clone())
            .collect())
    }
}
