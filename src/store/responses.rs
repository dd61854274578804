//! ResponseStore — replies the pipeline has dispatched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::db::Database;

/// A reply recorded against an inbound message.
#[derive(Debug, Clone)]
pub struct MessageResponse {
    pub id: i64,
    pub message_id: String,
    pub content: String,
    pub template_id: Option<i64>,
    pub sent_at: DateTime<Utc>,
}

/// Persistent storage for dispatched replies.
#[derive(Clone)]
pub struct ResponseStore {
    db: Arc<Database>,
}

impl ResponseStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record a dispatched reply. Returns the new row id.
    pub fn insert(
        &self,
        message_id: &str,
        content: &str,
        template_id: Option<i64>,
    ) -> Result<i64, rusqlite::Error> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO message_responses (message_id, content, template_id, sent_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![message_id, content, template_id, Utc::now().to_rfc3339()],
        )?;
        debug!(message_id = message_id, "Response recorded");
        Ok(conn.last_insert_rowid())
    }

    /// All replies recorded for a message.
    pub fn for_message(&self, message_id: &str) -> Result<Vec<MessageResponse>, rusqlite::Error> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, message_id, content, template_id, sent_at
             FROM message_responses WHERE message_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![message_id], |row| {
            let sent_str: String = row.get(4)?;
            Ok(MessageResponse {
                id: row.get(0)?,
                message_id: row.get(1)?,
                content: row.get(2)?,
                template_id: row.get(3)?,
                sent_at: DateTime::parse_from_rfc3339(&sent_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC),
            })
        })?;
        rows.collect()
    }
}
