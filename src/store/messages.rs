//! MessageStore — lifecycle-aware persistence for inbound messages.
//!
//! Status moves monotonically `received → processed → {replied | failed}`.
//! Every transition is a guarded UPDATE, so a second worker claiming the
//! same message sees zero rows changed and backs off.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::db::Database;
use crate::channels::Channel;

/// Lifecycle state of a tracked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Ingested, awaiting automated handling.
    Received,
    /// Claimed by the pipeline; committed to automated handling.
    Processed,
    /// A reply was dispatched successfully.
    Replied,
    /// Dispatch or account resolution failed.
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processed => "processed",
            Self::Replied => "replied",
            Self::Failed => "failed",
        }
    }
}

/// A persisted inbound message.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    /// Channel-native id, used to deduplicate fetched mail.
    pub external_id: Option<String>,
    pub owner: String,
    pub channel: Channel,
    pub sender: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: MessageStatus,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Persistent message storage backed by SQLite.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
}

impl MessageStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new inbound message with status `received`.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &self,
        owner: &str,
        channel: Channel,
        sender: &str,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
        external_id: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> Result<Message, rusqlite::Error> {
        let id = Uuid::new_v4().to_string();
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO messages (id, external_id, owner, channel, sender, recipient,
                subject, body, status, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'received', ?9)",
            rusqlite::params![
                id,
                external_id,
                owner,
                channel.as_str(),
                sender,
                recipient,
                subject,
                body,
                received_at.to_rfc3339(),
            ],
        )?;
        debug!(id = %id, owner = owner, channel = %channel, "Message ingested");
        Ok(Message {
            id,
            external_id: external_id.map(String::from),
            owner: owner.to_string(),
            channel,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            subject: subject.map(String::from),
            body: body.to_string(),
            status: MessageStatus::Received,
            received_at,
            processed_at: None,
        })
    }

    /// Look up a message by id.
    pub fn get(&self, id: &str) -> Result<Option<Message>, rusqlite::Error> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, external_id, owner, channel, sender, recipient,
                    subject, body, status, received_at, processed_at
             FROM messages WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![id], row_to_message)?;
        match rows.next() {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Look up a message by its channel-native id.
    pub fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Message>, rusqlite::Error> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, external_id, owner, channel, sender, recipient,
                    subject, body, status, received_at, processed_at
             FROM messages WHERE external_id = ?1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![external_id], row_to_message)?;
        match rows.next() {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// All `received` messages across owners, oldest first.
    pub fn pending(&self) -> Result<Vec<Message>, rusqlite::Error> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, external_id, owner, channel, sender, recipient,
                    subject, body, status, received_at, processed_at
             FROM messages WHERE status = 'received'
             ORDER BY received_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([], row_to_message)?;
        rows.collect()
    }

    /// Atomically claim a message for automated handling.
    ///
    /// Transitions `received → processed` and stamps `processed_at`.
    /// Returns `false` when the message was not in `received` (already
    /// claimed by another worker, or terminal).
    pub fn claim(&self, id: &str, at: DateTime<Utc>) -> Result<bool, rusqlite::Error> {
        let conn = self.db.conn();
        let changed = conn.execute(
            "UPDATE messages SET status = 'processed', processed_at = ?2
             WHERE id = ?1 AND status = 'received'",
            rusqlite::params![id, at.to_rfc3339()],
        )?;
        if changed == 1 {
            debug!(id = id, "Message claimed for processing");
        }
        Ok(changed == 1)
    }

    /// Transition `processed → replied`. Returns `false` if not in `processed`.
    pub fn mark_replied(&self, id: &str) -> Result<bool, rusqlite::Error> {
        self.finish(id, MessageStatus::Replied)
    }

    /// Transition `processed → failed`. Returns `false` if not in `processed`.
    pub fn mark_failed(&self, id: &str) -> Result<bool, rusqlite::Error> {
        self.finish(id, MessageStatus::Failed)
    }

    fn finish(&self, id: &str, status: MessageStatus) -> Result<bool, rusqlite::Error> {
        let conn = self.db.conn();
        let changed = conn.execute(
            "UPDATE messages SET status = ?2 WHERE id = ?1 AND status = 'processed'",
            rusqlite::params![id, status.as_str()],
        )?;
        debug!(id = id, status = status.as_str(), "Message status updated");
        Ok(changed == 1)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn str_to_status(s: &str) -> MessageStatus {
    match s {
        "processed" => MessageStatus::Processed,
        "replied" => MessageStatus::Replied,
        "failed" => MessageStatus::Failed,
        _ => MessageStatus::Received,
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, rusqlite::Error> {
    let channel_str: String = row.get(3)?;
    let channel = Channel::parse(&channel_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown channel '{channel_str}'").into(),
        )
    })?;
    let status_str: String = row.get(8)?;
    let received_str: String = row.get(9)?;
    let processed_str: Option<String> = row.get(10)?;

    Ok(Message {
        id: row.get(0)?,
        external_id: row.get(1)?,
        owner: row.get(2)?,
        channel,
        sender: row.get(4)?,
        recipient: row.get(5)?,
        subject: row.get(6)?,
        body: row.get(7)?,
        status: str_to_status(&status_str),
        received_at: parse_datetime(&received_str),
        processed_at: processed_str.as_deref().map(parse_datetime),
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> MessageStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        MessageStore::new(db)
    }

    fn ingest(store: &MessageStore, external_id: Option<&str>) -> Message {
        store
            .insert(
                "alice",
                Channel::Email,
                "customer@example.com",
                "support@corp.test",
                Some("Hello"),
                "Hello, quick question",
                external_id,
                Utc::now(),
            )
            .unwrap()
    }

    #[test]
    fn insert_and_get() {
        let store = test_store();
        let msg = ingest(&store, None);

        let loaded = store.get(&msg.id).unwrap().unwrap();
        assert_eq!(loaded.owner, "alice");
        assert_eq!(loaded.channel, Channel::Email);
        assert_eq!(loaded.status, MessageStatus::Received);
        assert_eq!(loaded.subject, Some("Hello".to_string()));
        assert!(loaded.processed_at.is_none());
    }

    #[test]
    fn get_unknown_id_is_none() {
        let store = test_store();
        assert!(store.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn external_id_dedup_enforced() {
        let store = test_store();
        ingest(&store, Some("imap-123"));
        let dup = store.insert(
            "alice",
            Channel::Email,
            "other@example.com",
            "support@corp.test",
            None,
            "second copy",
            Some("imap-123"),
            Utc::now(),
        );
        assert!(dup.is_err());
    }

    #[test]
    fn find_by_external_id() {
        let store = test_store();
        let msg = ingest(&store, Some("imap-42"));
        let found = store.find_by_external_id("imap-42").unwrap().unwrap();
        assert_eq!(found.id, msg.id);
        assert!(store.find_by_external_id("imap-43").unwrap().is_none());
    }

    #[test]
    fn pending_lists_received_only() {
        let store = test_store();
        let first = ingest(&store, None);
        let second = ingest(&store, None);

        store.claim(&second.id, Utc::now()).unwrap();

        let pending = store.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);
    }

    #[test]
    fn claim_is_exclusive() {
        let store = test_store();
        let msg = ingest(&store, None);

        assert!(store.claim(&msg.id, Utc::now()).unwrap());
        // Second claim loses the race
        assert!(!store.claim(&msg.id, Utc::now()).unwrap());

        let loaded = store.get(&msg.id).unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Processed);
        assert!(loaded.processed_at.is_some());
    }

    #[test]
    fn replied_requires_claim_first() {
        let store = test_store();
        let msg = ingest(&store, None);

        // Cannot skip `processed`
        assert!(!store.mark_replied(&msg.id).unwrap());

        store.claim(&msg.id, Utc::now()).unwrap();
        assert!(store.mark_replied(&msg.id).unwrap());
        assert_eq!(
            store.get(&msg.id).unwrap().unwrap().status,
            MessageStatus::Replied
        );
    }

    #[test]
    fn failed_is_terminal() {
        let store = test_store();
        let msg = ingest(&store, None);

        store.claim(&msg.id, Utc::now()).unwrap();
        assert!(store.mark_failed(&msg.id).unwrap());
        // No transition out of `failed`
        assert!(!store.mark_replied(&msg.id).unwrap());
        assert!(!store.claim(&msg.id, Utc::now()).unwrap());
        assert_eq!(
            store.get(&msg.id).unwrap().unwrap().status,
            MessageStatus::Failed
        );
    }
}
