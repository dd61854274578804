//! TemplateStore — pre-authored reply templates scoped by channel.

use std::sync::Arc;

use super::db::Database;
use crate::channels::Channel;

/// Which channels a template may serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelScope {
    Email,
    Whatsapp,
    Both,
}

impl ChannelScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Whatsapp => "whatsapp",
            Self::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "whatsapp" => Some(Self::Whatsapp),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    /// Whether a template with this scope may serve the given channel.
    pub fn matches(&self, channel: Channel) -> bool {
        match self {
            Self::Both => true,
            Self::Email => channel == Channel::Email,
            Self::Whatsapp => channel == Channel::Whatsapp,
        }
    }
}

/// A pre-authored reply template.
#[derive(Debug, Clone)]
pub struct ResponseTemplate {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub content: String,
    pub scope: ChannelScope,
    pub is_default: bool,
    /// Links the template to an intent category, if any.
    pub category_id: Option<i64>,
}

/// Read access to an owner's reply templates.
#[derive(Clone)]
pub struct TemplateStore {
    db: Arc<Database>,
}

impl TemplateStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a template. Returns the new row id.
    pub fn insert(
        &self,
        owner: &str,
        name: &str,
        content: &str,
        scope: ChannelScope,
        is_default: bool,
        category_id: Option<i64>,
    ) -> Result<i64, rusqlite::Error> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO response_templates
                (owner, name, content, scope, is_default, category_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![owner, name, content, scope.as_str(), is_default, category_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All templates for an owner in catalog order (ascending id).
    pub fn for_owner(&self, owner: &str) -> Result<Vec<ResponseTemplate>, rusqlite::Error> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, owner, name, content, scope, is_default, category_id
             FROM response_templates WHERE owner = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![owner], row_to_template)?;
        rows.collect()
    }
}

fn row_to_template(row: &rusqlite::Row<'_>) -> Result<ResponseTemplate, rusqlite::Error> {
    let scope_str: String = row.get(4)?;
    let scope = ChannelScope::parse(&scope_str).unwrap_or(ChannelScope::Both);
    Ok(ResponseTemplate {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        content: row.get(3)?,
        scope,
        is_default: row.get(5)?,
        category_id: row.get(6)?,
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> TemplateStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        TemplateStore::new(db)
    }

    #[test]
    fn scope_matching() {
        assert!(ChannelScope::Both.matches(Channel::Email));
        assert!(ChannelScope::Both.matches(Channel::Whatsapp));
        assert!(ChannelScope::Email.matches(Channel::Email));
        assert!(!ChannelScope::Email.matches(Channel::Whatsapp));
        assert!(!ChannelScope::Whatsapp.matches(Channel::Email));
    }

    #[test]
    fn for_owner_in_id_order() {
        let store = test_store();
        store
            .insert("alice", "first", "Hello!", ChannelScope::Both, false, None)
            .unwrap();
        store
            .insert("alice", "second", "Hi!", ChannelScope::Email, true, None)
            .unwrap();
        store
            .insert("bob", "other", "Hey", ChannelScope::Both, false, None)
            .unwrap();

        let templates = store.for_owner("alice").unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].name, "first");
        assert_eq!(templates[1].name, "second");
        assert!(templates[1].is_default);
    }

    #[test]
    fn unknown_scope_defaults_to_both() {
        assert_eq!(ChannelScope::parse("smoke-signal"), None);
    }
}
