//! WhatsApp adapter — Cloud API text messages over HTTP.
//!
//! Outbound only: inbound WhatsApp messages arrive through provider
//! webhooks, which hand them to the pipeline's ingest entry point. The
//! adapter therefore reports no unread messages.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{debug, info};

use crate::channels::{Channel, ChannelAdapter, DispatchAccount, RawMessage};
use crate::error::ChannelError;
use crate::store::accounts::WhatsAppAccount;

/// WhatsApp channel adapter.
pub struct WhatsAppAdapter {
    http: reqwest::Client,
}

impl Default for WhatsAppAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WhatsAppAdapter {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

/// Cloud API text message payload.
#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

fn messages_url(account: &WhatsAppAccount) -> String {
    format!(
        "{}/{}/messages",
        account.api_url.trim_end_matches('/'),
        account.phone_number_id
    )
}

#[async_trait]
impl ChannelAdapter for WhatsAppAdapter {
    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    async fn send(
        &self,
        account: &DispatchAccount,
        recipient: &str,
        _subject: Option<&str>,
        body: &str,
    ) -> Result<(), ChannelError> {
        let DispatchAccount::WhatsApp(account) = account else {
            return Err(ChannelError::AccountMismatch {
                channel: Channel::Whatsapp,
            });
        };

        let payload = TextMessage {
            messaging_product: "whatsapp",
            to: recipient,
            kind: "text",
            text: TextBody { body },
        };

        let response = self
            .http
            .post(messages_url(account))
            .bearer_auth(account.access_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                channel: Channel::Whatsapp,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                channel: Channel::Whatsapp,
                reason: format!("API returned {status}: {detail}"),
            });
        }

        info!(to = recipient, from = %account.phone_number, "WhatsApp message sent");
        Ok(())
    }

    async fn fetch_unread(
        &self,
        account: &DispatchAccount,
    ) -> Result<Vec<RawMessage>, ChannelError> {
        let DispatchAccount::WhatsApp(account) = account else {
            return Err(ChannelError::AccountMismatch {
                channel: Channel::Whatsapp,
            });
        };

        // Inbound arrives via webhook → ingest; nothing to poll here.
        debug!(account = %account.phone_number, "WhatsApp inbound is webhook-driven");
        Ok(Vec::new())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
