//! Channel adapters — transport I/O for email and WhatsApp.
//!
//! Adapters are pure I/O: they send a reply through an owner's dispatch
//! account and fetch unread inbound messages. All decision logic lives in
//! the pipeline. The orchestrator resolves the adapter once per message
//! through [`AdapterRegistry`] instead of branching on the channel in
//! every method.

pub mod email;
pub mod whatsapp;

pub use email::EmailAdapter;
pub use whatsapp::WhatsAppAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ChannelError;
use crate::store::accounts::{EmailAccount, WhatsAppAccount};

// ── Channel ─────────────────────────────────────────────────────────

/// Transport a message travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Email,
    Whatsapp,
}

impl Channel {
    /// Stable identifier used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Whatsapp => "whatsapp",
        }
    }

    /// Parse a stored identifier back into a channel.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "whatsapp" => Some(Self::Whatsapp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw inbound message ─────────────────────────────────────────────

/// An inbound message as fetched from a transport, before ingestion.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Channel-native id (IMAP Message-ID, provider message id).
    pub external_id: String,
    pub sender: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

// ── Dispatch account ────────────────────────────────────────────────

/// The account a reply is dispatched from, one variant per channel.
#[derive(Debug, Clone)]
pub enum DispatchAccount {
    Email(EmailAccount),
    WhatsApp(WhatsAppAccount),
}

impl DispatchAccount {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Email(_) => Channel::Email,
            Self::WhatsApp(_) => Channel::Whatsapp,
        }
    }

    pub fn owner(&self) -> &str {
        match self {
            Self::Email(a) => &a.owner,
            Self::WhatsApp(a) => &a.owner,
        }
    }
}

// ── Channel adapter trait ───────────────────────────────────────────

/// Trait for channel adapters — send and fetch, nothing else.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The channel this adapter serves.
    fn channel(&self) -> Channel;

    /// Send a reply through the given dispatch account.
    async fn send(
        &self,
        account: &DispatchAccount,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
    ) -> Result<(), ChannelError>;

    /// Fetch unread inbound messages for the given account, marking them
    /// seen on the remote side.
    async fn fetch_unread(
        &self,
        account: &DispatchAccount,
    ) -> Result<Vec<RawMessage>, ChannelError>;
}

// ── Adapter registry ────────────────────────────────────────────────

/// Adapters keyed by channel, resolved once at the pipeline boundary.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own channel. Last registration wins.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.channel(), adapter);
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&channel).cloned()
    }
}
