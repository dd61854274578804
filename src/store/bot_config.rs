//! BotConfigStore — per-owner auto-reply configuration.

use std::sync::Arc;

use chrono::NaiveTime;

use super::db::Database;
use crate::channels::Channel;

/// A working-hours window, inclusive start, exclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    /// Whether `t` falls inside `[start, end)`.
    pub fn contains(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }
}

/// An owner's auto-reply configuration. Read-only input to the pipeline.
#[derive(Debug, Clone)]
pub struct BotConfiguration {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub active: bool,
    pub auto_reply_email: bool,
    pub auto_reply_whatsapp: bool,
    pub working_hours: Option<WorkingHours>,
}

impl BotConfiguration {
    /// Whether auto-reply is enabled for the given channel.
    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.auto_reply_email,
            Channel::Whatsapp => self.auto_reply_whatsapp,
        }
    }
}

/// Read access to bot configurations.
#[derive(Clone)]
pub struct BotConfigStore {
    db: Arc<Database>,
}

impl BotConfigStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a configuration. Returns the new row id.
    pub fn insert(
        &self,
        owner: &str,
        name: &str,
        active: bool,
        auto_reply_email: bool,
        auto_reply_whatsapp: bool,
        working_hours: Option<WorkingHours>,
    ) -> Result<i64, rusqlite::Error> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO bot_configurations
                (owner, name, active, auto_reply_email, auto_reply_whatsapp,
                 working_hours_start, working_hours_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                owner,
                name,
                active,
                auto_reply_email,
                auto_reply_whatsapp,
                working_hours.map(|w| w.start.format("%H:%M:%S").to_string()),
                working_hours.map(|w| w.end.format("%H:%M:%S").to_string()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The owner's active configuration, lowest id wins.
    pub fn active_for(&self, owner: &str) -> Result<Option<BotConfiguration>, rusqlite::Error> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, owner, name, active, auto_reply_email, auto_reply_whatsapp,
                    working_hours_start, working_hours_end
             FROM bot_configurations
             WHERE owner = ?1 AND active = 1
             ORDER BY id ASC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![owner], row_to_config)?;
        match rows.next() {
            Some(Ok(cfg)) => Ok(Some(cfg)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S").ok()
}

fn row_to_config(row: &rusqlite::Row<'_>) -> Result<BotConfiguration, rusqlite::Error> {
    let start: Option<String> = row.get(6)?;
    let end: Option<String> = row.get(7)?;
    // The window only applies when both bounds are present and parse
    let working_hours = match (
        start.as_deref().and_then(parse_time),
        end.as_deref().and_then(parse_time),
    ) {
        (Some(start), Some(end)) => Some(WorkingHours { start, end }),
        _ => None,
    };

    Ok(BotConfiguration {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        active: row.get(3)?,
        auto_reply_email: row.get(4)?,
        auto_reply_whatsapp: row.get(5)?,
        working_hours,
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> BotConfigStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        BotConfigStore::new(db)
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn active_for_returns_lowest_active_id() {
        let store = test_store();
        store
            .insert("alice", "old bot", false, true, true, None)
            .unwrap();
        let second = store
            .insert("alice", "first active", true, true, false, None)
            .unwrap();
        store
            .insert("alice", "second active", true, false, true, None)
            .unwrap();

        let cfg = store.active_for("alice").unwrap().unwrap();
        assert_eq!(cfg.id, second);
        assert_eq!(cfg.name, "first active");
    }

    #[test]
    fn active_for_none_when_all_inactive() {
        let store = test_store();
        store
            .insert("alice", "off", false, true, true, None)
            .unwrap();
        assert!(store.active_for("alice").unwrap().is_none());
        assert!(store.active_for("bob").unwrap().is_none());
    }

    #[test]
    fn working_hours_roundtrip() {
        let store = test_store();
        let hours = WorkingHours {
            start: t(9, 0),
            end: t(17, 30),
        };
        store
            .insert("alice", "day bot", true, true, true, Some(hours))
            .unwrap();

        let cfg = store.active_for("alice").unwrap().unwrap();
        assert_eq!(cfg.working_hours, Some(hours));
    }

    #[test]
    fn working_hours_window_is_half_open() {
        let hours = WorkingHours {
            start: t(9, 0),
            end: t(17, 0),
        };
        assert!(hours.contains(t(9, 0)));
        assert!(hours.contains(t(12, 15)));
        assert!(!hours.contains(t(17, 0)));
        assert!(!hours.contains(t(8, 59)));
    }

    #[test]
    fn channel_enabled_follows_toggles() {
        let cfg = BotConfiguration {
            id: 1,
            owner: "alice".into(),
            name: "bot".into(),
            active: true,
            auto_reply_email: true,
            auto_reply_whatsapp: false,
            working_hours: None,
        };
        assert!(cfg.channel_enabled(Channel::Email));
        assert!(!cfg.channel_enabled(Channel::Whatsapp));
    }
}
