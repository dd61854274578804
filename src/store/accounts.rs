//! AccountStore — the email and WhatsApp accounts replies dispatch from.

use std::sync::Arc;

use secrecy::SecretString;

use super::db::Database;
use crate::channels::Channel;

/// An owner's configured email account (SMTP out, IMAP in).
#[derive(Debug, Clone)]
pub struct EmailAccount {
    pub id: i64,
    pub owner: String,
    pub address: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    pub active: bool,
}

/// An owner's WhatsApp Cloud API account.
#[derive(Debug, Clone)]
pub struct WhatsAppAccount {
    pub id: i64,
    pub owner: String,
    pub phone_number: String,
    /// Cloud API base URL, e.g. `https://graph.facebook.com/v17.0`.
    pub api_url: String,
    pub phone_number_id: String,
    pub access_token: SecretString,
    pub active: bool,
}

/// Read access to dispatch accounts.
#[derive(Clone)]
pub struct AccountStore {
    db: Arc<Database>,
}

impl AccountStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert an email account. Returns the new row id.
    #[allow(clippy::too_many_arguments)]
    pub fn add_email_account(
        &self,
        owner: &str,
        address: &str,
        smtp_host: &str,
        smtp_port: u16,
        imap_host: &str,
        imap_port: u16,
        username: &str,
        password: &str,
        active: bool,
    ) -> Result<i64, rusqlite::Error> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO email_accounts
                (owner, address, smtp_host, smtp_port, imap_host, imap_port,
                 username, password, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                owner, address, smtp_host, smtp_port, imap_host, imap_port, username, password,
                active,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a WhatsApp account. Returns the new row id.
    pub fn add_whatsapp_account(
        &self,
        owner: &str,
        phone_number: &str,
        api_url: &str,
        phone_number_id: &str,
        access_token: &str,
        active: bool,
    ) -> Result<i64, rusqlite::Error> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO whatsapp_accounts
                (owner, phone_number, api_url, phone_number_id, access_token, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![owner, phone_number, api_url, phone_number_id, access_token, active],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The owner's active email account, lowest id wins.
    pub fn active_email_for(&self, owner: &str) -> Result<Option<EmailAccount>, rusqlite::Error> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, owner, address, smtp_host, smtp_port, imap_host, imap_port,
                    username, password, active
             FROM email_accounts WHERE owner = ?1 AND active = 1
             ORDER BY id ASC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![owner], row_to_email_account)?;
        match rows.next() {
            Some(Ok(acct)) => Ok(Some(acct)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// The owner's active WhatsApp account, lowest id wins.
    pub fn active_whatsapp_for(
        &self,
        owner: &str,
    ) -> Result<Option<WhatsAppAccount>, rusqlite::Error> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, owner, phone_number, api_url, phone_number_id, access_token, active
             FROM whatsapp_accounts WHERE owner = ?1 AND active = 1
             ORDER BY id ASC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(rusqlite::params![owner], row_to_whatsapp_account)?;
        match rows.next() {
            Some(Ok(acct)) => Ok(Some(acct)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Every active email account across owners, for inbound polling.
    pub fn active_email_accounts(&self) -> Result<Vec<EmailAccount>, rusqlite::Error> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, owner, address, smtp_host, smtp_port, imap_host, imap_port,
                    username, password, active
             FROM email_accounts WHERE active = 1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], row_to_email_account)?;
        rows.collect()
    }

    /// Resolve the owner of an inbound message from its lookup key —
    /// the receiving address (email) or phone number (WhatsApp).
    /// Matching is case-insensitive and restricted to active accounts.
    pub fn resolve_owner(
        &self,
        channel: Channel,
        key: &str,
    ) -> Result<Option<String>, rusqlite::Error> {
        let conn = self.db.conn();
        let sql = match channel {
            Channel::Email => {
                "SELECT owner FROM email_accounts
                 WHERE active = 1 AND LOWER(address) = LOWER(?1)
                 ORDER BY id ASC LIMIT 1"
            }
            Channel::Whatsapp => {
                "SELECT owner FROM whatsapp_accounts
                 WHERE active = 1 AND LOWER(phone_number) = LOWER(?1)
                 ORDER BY id ASC LIMIT 1"
            }
        };
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query_map(rusqlite::params![key], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(Ok(owner)) => Ok(Some(owner)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn row_to_email_account(row: &rusqlite::Row<'_>) -> Result<EmailAccount, rusqlite::Error> {
    let password: String = row.get(8)?;
    Ok(EmailAccount {
        id: row.get(0)?,
        owner: row.get(1)?,
        address: row.get(2)?,
        smtp_host: row.get(3)?,
        smtp_port: row.get::<_, i64>(4)? as u16,
        imap_host: row.get(5)?,
        imap_port: row.get::<_, i64>(6)? as u16,
        username: row.get(7)?,
        password: SecretString::from(password),
        active: row.get(9)?,
    })
}

fn row_to_whatsapp_account(row: &rusqlite::Row<'_>) -> Result<WhatsAppAccount, rusqlite::Error> {
    let token: String = row.get(5)?;
    Ok(WhatsAppAccount {
        id: row.get(0)?,
        owner: row.get(1)?,
        phone_number: row.get(2)?,
        api_url: row.get(3)?,
        phone_number_id: row.get(4)?,
        access_token: SecretString::from(token),
        active: row.get(6)?,
    })
}

// ── Tests ───────────────────────────────────────────────────────────
