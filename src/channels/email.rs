//! Email adapter — SMTP via lettre for outbound, IMAP over rustls for inbound.
//!
//! All transport parameters come from the dispatch account, so one
//! adapter instance serves every configured mailbox. Both directions run
//! on `spawn_blocking`: lettre's sync SMTP transport and the raw IMAP
//! session are blocking I/O.

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use mail_parser::{MessageParser, MimeHeaders};
use secrecy::ExposeSecret;
use tracing::{debug, info};
use uuid::Uuid;

use crate::channels::{Channel, ChannelAdapter, DispatchAccount, RawMessage};
use crate::error::ChannelError;
use crate::store::accounts::EmailAccount;

/// Socket read timeout for the IMAP session.
const IMAP_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Email channel adapter.
#[derive(Default)]
pub struct EmailAdapter;

impl EmailAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        account: &DispatchAccount,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
    ) -> Result<(), ChannelError> {
        let DispatchAccount::Email(account) = account else {
            return Err(ChannelError::AccountMismatch {
                channel: Channel::Email,
            });
        };

        let account = account.clone();
        let recipient = recipient.to_string();
        let subject = subject.unwrap_or("Automatic reply").to_string();
        let body = body.to_string();

        tokio::task::spawn_blocking(move || smtp_send(&account, &recipient, &subject, &body))
            .await
            .map_err(|e| ChannelError::SendFailed {
                channel: Channel::Email,
                reason: format!("send task panicked: {e}"),
            })?
    }

    async fn fetch_unread(
        &self,
        account: &DispatchAccount,
    ) -> Result<Vec<RawMessage>, ChannelError> {
        let DispatchAccount::Email(account) = account else {
            return Err(ChannelError::AccountMismatch {
                channel: Channel::Email,
            });
        };

        let account = account.clone();
        tokio::task::spawn_blocking(move || {
            fetch_unseen(&account).map_err(|e| ChannelError::FetchFailed {
                channel: Channel::Email,
                reason: e.to_string(),
            })
        })
        .await
        .map_err(|e| ChannelError::FetchFailed {
            channel: Channel::Email,
            reason: format!("fetch task panicked: {e}"),
        })?
    }
}

// ── SMTP ────────────────────────────────────────────────────────────

fn smtp_send(
    account: &EmailAccount,
    recipient: &str,
    subject: &str,
    body: &str,
) -> Result<(), ChannelError> {
    let send_err = |reason: String| ChannelError::SendFailed {
        channel: Channel::Email,
        reason,
    };

    let creds = Credentials::new(
        account.username.clone(),
        account.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::relay(&account.smtp_host)
        .map_err(|e| send_err(format!("SMTP relay error: {e}")))?
        .port(account.smtp_port)
        .credentials(creds)
        .build();

    let email = lettre::Message::builder()
        .from(
            account
                .address
                .parse()
                .map_err(|e| send_err(format!("Invalid from address: {e}")))?,
        )
        .to(recipient
            .parse()
            .map_err(|e| send_err(format!("Invalid to address: {e}")))?)
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| send_err(format!("Failed to build email: {e}")))?;

    transport
        .send(&email)
        .map_err(|e| send_err(format!("SMTP send failed: {e}")))?;

    info!(to = recipient, from = %account.address, "Email sent");
    Ok(())
}

// ── IMAP fetch ──────────────────────────────────────────────────────

type ImapError = Box<dyn std::error::Error + Send + Sync>;

/// Fetch unseen mail for an account and mark it \Seen (blocking).
fn fetch_unseen(account: &EmailAccount) -> Result<Vec<RawMessage>, ImapError> {
    let mut session = ImapSession::connect(&account.imap_host, account.imap_port)?;
    session.login(&account.username, account.password.expose_secret())?;
    session.select_inbox()?;

    let uids = session.search_unseen()?;
    debug!(
        account = %account.address,
        unseen = uids.len(),
        "IMAP unseen search complete"
    );

    let mut results = Vec::with_capacity(uids.len());
    for uid in &uids {
        let raw = session.fetch_raw(uid)?;
        if let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) {
            results.push(to_raw_message(&parsed, &account.address));
        }
        // Mark seen regardless so an unparseable message is not refetched
        session.mark_seen(uid);
    }

    session.logout();
    Ok(results)
}

fn to_raw_message(parsed: &mail_parser::Message, recipient: &str) -> RawMessage {
    let external_id = parsed
        .message_id()
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));
    RawMessage {
        external_id,
        sender: extract_sender(parsed),
        recipient: recipient.to_string(),
        subject: parsed.subject().map(|s| s.to_string()),
        body: extract_text(parsed),
        received_at: message_date(parsed),
    }
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Extract readable text from a parsed email, preferring plain text.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    "(no readable content)".to_string()
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn message_date(parsed: &mail_parser::Message) -> DateTime<Utc> {
    parsed
        .date()
        .and_then(|d| {
            chrono::NaiveDate::from_ymd_opt(d.year as i32, u32::from(d.month), u32::from(d.day))
                .and_then(|date| {
                    date.and_hms_opt(
                        u32::from(d.hour),
                        u32::from(d.minute),
                        u32::from(d.second),
                    )
                })
                .map(|naive| naive.and_utc())
        })
        .unwrap_or_else(Utc::now)
}

// ── IMAP session ────────────────────────────────────────────────────

/// A minimal tagged IMAP session over rustls.
struct ImapSession {
    tls: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
    tag: u32,
}

impl ImapSession {
    fn connect(host: &str, port: u16) -> Result<Self, ImapError> {
        let tcp = TcpStream::connect((host, port))?;
        tcp.set_read_timeout(Some(IMAP_READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name: rustls::pki_types::ServerName<'_> =
            rustls::pki_types::ServerName::try_from(host.to_string())?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)?;
        let tls = rustls::StreamOwned::new(conn, tcp);

        let mut session = Self { tls, tag: 0 };
        // Server greeting
        session.read_line()?;
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, ImapError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match std::io::Read::read(&mut self.tls, &mut byte) {
                Ok(0) => return Err("IMAP connection closed".into()),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send a tagged command and read lines until the tagged completion.
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, ImapError> {
        self.tag += 1;
        let tag = format!("R{}", self.tag);
        let full = format!("{tag} {cmd}\r\n");
        std::io::Write::write_all(&mut self.tls, full.as_bytes())?;
        std::io::Write::flush(&mut self.tls)?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                break;
            }
        }
        Ok(lines)
    }

    fn login(&mut self, username: &str, password: &str) -> Result<(), ImapError> {
        let resp = self.command(&format!("LOGIN \"{username}\" \"{password}\""))?;
        if resp.last().is_some_and(|l| l.contains("OK")) {
            Ok(())
        } else {
            Err("IMAP login failed".into())
        }
    }

    fn select_inbox(&mut self) -> Result<(), ImapError> {
        self.command("SELECT \"INBOX\"")?;
        Ok(())
    }

    fn search_unseen(&mut self) -> Result<Vec<String>, ImapError> {
        let resp = self.command("SEARCH UNSEEN")?;
        let mut uids = Vec::new();
        for line in &resp {
            if line.starts_with("* SEARCH") {
                uids.extend(
                    line.split_whitespace()
                        .skip(2)
                        .map(|s| s.trim().to_string()),
                );
            }
        }
        Ok(uids)
    }

    fn fetch_raw(&mut self, uid: &str) -> Result<String, ImapError> {
        let resp = self.command(&format!("FETCH {uid} RFC822"))?;
        // Drop the untagged FETCH header and the tagged completion line
        Ok(resp
            .iter()
            .skip(1)
            .take(resp.len().saturating_sub(2))
            .cloned()
            .collect())
    }

    fn mark_seen(&mut self, uid: &str) {
        let _ = self.command(&format!("STORE {uid} +FLAGS (\\Seen)"));
    }

    fn logout(&mut self) {
        let _ = self.command("LOGOUT");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use secrecy::SecretString;

    use crate::store::accounts::WhatsAppAccount;

    fn whatsapp_account() -> DispatchAccount {
        DispatchAccount::WhatsApp(WhatsAppAccount {
            id: 1,
            owner: "alice".into(),
            phone_number: "+15550001111".into(),
            api_url: "https://graph.facebook.com/v17.0".into(),
            phone_number_id: "123".into(),
            access_token: SecretString::from("token"),
            active: true,
        })
    }

    #[test]
    fn adapter_serves_email_channel() {
        assert_eq!(EmailAdapter::new().channel(), Channel::Email);
    }

    #[tokio::test]
    async fn send_rejects_foreign_account() {
        let adapter = EmailAdapter::new();
        let result = adapter
            .send(&whatsapp_account(), "someone@example.com", None, "hi")
            .await;
        assert!(matches!(
            result,
            Err(ChannelError::AccountMismatch {
                channel: Channel::Email
            })
        ));
    }

    #[tokio::test]
    async fn fetch_rejects_foreign_account() {
        let adapter = EmailAdapter::new();
        let result = adapter.fetch_unread(&whatsapp_account()).await;
        assert!(matches!(
            result,
            Err(ChannelError::AccountMismatch {
                channel: Channel::Email
            })
        ));
    }

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
    }

    #[test]
    fn strip_html_nested_and_attributes() {
        assert_eq!(
            strip_html(r#"<div><a href="https://example.com">Link</a> and <i>italic</i></div>"#),
            "Link and italic"
        );
    }

    #[test]
    fn strip_html_normalizes_whitespace() {
        assert_eq!(strip_html("<p>  Hello   World  </p>"), "Hello World");
    }

    #[test]
    fn strip_html_plain_passthrough() {
        assert_eq!(strip_html("No HTML here"), "No HTML here");
    }

    #[test]
    fn parses_plain_email() {
        let raw = "Message-ID: <abc@mail>\r\nFrom: Alice <alice@example.com>\r\n\
                   To: support@corp.test\r\nSubject: Hi there\r\n\r\nHello support team";
        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let msg = to_raw_message(&parsed, "support@corp.test");

        assert_eq!(msg.external_id, "abc@mail");
        assert_eq!(msg.sender, "alice@example.com");
        assert_eq!(msg.recipient, "support@corp.test");
        assert_eq!(msg.subject.as_deref(), Some("Hi there"));
        assert!(msg.body.contains("Hello support team"));
    }

    #[test]
    fn missing_message_id_gets_generated() {
        let raw = "From: alice@example.com\r\nSubject: x\r\n\r\nbody";
        let parsed = MessageParser::default().parse(raw.as_bytes()).unwrap();
        let msg = to_raw_message(&parsed, "support@corp.test");
        assert!(msg.external_id.starts_with("gen-"));
    }
}
