//! IntentStore — the static intent catalog and per-message intent links.
//!
//! Intents and categories are reference data, read-only during processing.
//! Links are the classifier's output; they are append-only, so a re-run
//! adds rows instead of replacing earlier ones (audit trail).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::db::Database;

/// A grouping of related intents, linkable from templates.
#[derive(Debug, Clone)]
pub struct IntentCategory {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// A cataloged purpose a message may express.
#[derive(Debug, Clone)]
pub struct Intent {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: String,
    /// Comma-separated keyword list, matched case-insensitively.
    pub keywords: String,
}

impl Intent {
    /// The keyword list, lower-cased, trimmed, empties removed.
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// One recorded classification for a message.
#[derive(Debug, Clone)]
pub struct MessageIntentLink {
    pub id: i64,
    pub message_id: String,
    pub intent_id: i64,
    pub confidence: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Access to the intent catalog and classification links.
#[derive(Clone)]
pub struct IntentStore {
    db: Arc<Database>,
}

impl IntentStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a category. Returns the new row id.
    pub fn add_category(&self, name: &str, description: &str) -> Result<i64, rusqlite::Error> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO intent_categories (name, description) VALUES (?1, ?2)",
            rusqlite::params![name, description],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert an intent. Returns the new row id.
    pub fn add_intent(
        &self,
        category_id: i64,
        name: &str,
        description: &str,
        keywords: &str,
    ) -> Result<i64, rusqlite::Error> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO intents (category_id, name, description, keywords)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![category_id, name, description, keywords],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The full intent catalog in catalog order (ascending id).
    pub fn all(&self) -> Result<Vec<Intent>, rusqlite::Error> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, category_id, name, description, keywords
             FROM intents ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Intent {
                id: row.get(0)?,
                category_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
                keywords: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    /// Whether the catalog has no intents yet.
    pub fn is_empty(&self) -> Result<bool, rusqlite::Error> {
        let conn = self.db.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM intents", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    /// Record a classification result. Append-only.
    pub fn record_link(
        &self,
        message_id: &str,
        intent_id: i64,
        confidence: f64,
    ) -> Result<i64, rusqlite::Error> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO message_intents (message_id, intent_id, confidence, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![message_id, intent_id, confidence, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All recorded classifications for a message, in recording order.
    pub fn links_for(&self, message_id: &str) -> Result<Vec<MessageIntentLink>, rusqlite::Error> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, message_id, intent_id, confidence, recorded_at
             FROM message_intents WHERE message_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![message_id], |row| {
            let recorded_str: String = row.get(4)?;
            Ok(MessageIntentLink {
                id: row.get(0)?,
                message_id: row.get(1)?,
                intent_id: row.get(2)?,
                confidence: row.get(3)?,
                recorded_at: DateTime::parse_from_rfc3339(&recorded_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC),
            })
        })?;
        rows.collect()
    }

    /// Install the default catalog when none exists yet, so the keyword
    /// fallback is useful out of the box.
    pub fn seed_defaults(&self) -> Result<(), rusqlite::Error> {
        if !self.is_empty()? {
            return Ok(());
        }

        let general = self.add_category("general", "Common customer inquiries")?;
        self.add_intent(
            general,
            "greeting",
            "The sender opens a conversation or says hello",
            "hello, hi, hey, good morning, good afternoon",
        )?;
        self.add_intent(
            general,
            "question",
            "The sender asks for information",
            "question, how, what, when, where, why",
        )?;
        self.add_intent(
            general,
            "problem",
            "The sender reports something not working",
            "problem, issue, error, broken, not working, complaint",
        )?;
        self.add_intent(
            general,
            "thanks",
            "The sender expresses gratitude",
            "thanks, thank you, appreciate, grateful",
        )?;
        self.add_intent(
            general,
            "appointment",
            "The sender wants to schedule a meeting",
            "appointment, meeting, schedule, call, available, availability",
        )?;

        info!("Seeded default intent catalog");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> IntentStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        IntentStore::new(db)
    }

    #[test]
    fn keyword_list_trims_and_lowercases() {
        let intent = Intent {
            id: 1,
            category_id: 1,
            name: "greeting".into(),
            description: String::new(),
            keywords: "Hello, HI ,  good morning,,".into(),
        };
        assert_eq!(intent.keyword_list(), vec!["hello", "hi", "good morning"]);
    }

    #[test]
    fn catalog_in_id_order() {
        let store = test_store();
        let cat = store.add_category("general", "").unwrap();
        store.add_intent(cat, "greeting", "", "hello").unwrap();
        store.add_intent(cat, "pricing", "", "price").unwrap();

        let all = store.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "greeting");
        assert_eq!(all[1].name, "pricing");
    }

    #[test]
    fn links_append_only() {
        let store = test_store();
        let cat = store.add_category("general", "").unwrap();
        let intent = store.add_intent(cat, "greeting", "", "hello").unwrap();

        store.record_link("msg-1", intent, 0.8).unwrap();
        store.record_link("msg-1", intent, 0.5).unwrap();

        let links = store.links_for("msg-1").unwrap();
        assert_eq!(links.len(), 2);
        assert!((links[0].confidence - 0.8).abs() < f64::EPSILON);
        assert!((links[1].confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn seed_defaults_only_once() {
        let store = test_store();
        assert!(store.is_empty().unwrap());

        store.seed_defaults().unwrap();
        let first = store.all().unwrap().len();
        assert!(first >= 5);

        store.seed_defaults().unwrap();
        assert_eq!(store.all().unwrap().len(), first);
    }
}
