//! Auto-reply orchestrator — drives the per-message state machine.
//!
//! A message is only ever handled by one worker: the `received →
//! processed` transition is an atomic claim, and a worker that loses the
//! claim backs off. Once claimed, the message ends in `replied` or
//! `failed`; there is no in-pipeline retry. Batch runs isolate
//! per-message faults and honor cooperative cancellation between
//! messages — an in-flight dispatch is allowed to complete.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Local, NaiveTime, Utc};
use tracing::{debug, error, info, warn};

use crate::channels::{AdapterRegistry, Channel, DispatchAccount};
use crate::config::PipelineConfig;
use crate::error::{ChannelError, DatabaseError, Error, PipelineError};
use crate::llm::LlmProvider;
use crate::nlp::{IntentClassifier, ResponseGenerator};
use crate::store::{
    AccountStore, BotConfigStore, BotConfiguration, Database, IntentStore, Message, MessageStatus,
    MessageStore, ResponseStore, TemplateStore,
};

/// Why a message was left untouched by the gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// All gates passed; the message is committed to automated handling.
    Proceed,
    /// The owner has no active bot configuration.
    NoActiveConfig,
    /// Auto-reply is disabled for the message's channel.
    ChannelDisabled,
    /// The current local time falls outside the working-hours window.
    OutsideHours,
}

impl GateDecision {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::NoActiveConfig => "no_active_config",
            Self::ChannelDisabled => "channel_disabled",
            Self::OutsideHours => "outside_hours",
        }
    }
}

/// Evaluate the configuration gates for a message.
///
/// Gate outcomes are not errors — a gated-out message keeps its
/// `received` status for manual handling or a later run.
pub(crate) fn evaluate_gate(
    config: Option<&BotConfiguration>,
    channel: Channel,
    now: NaiveTime,
) -> GateDecision {
    let Some(config) = config else {
        return GateDecision::NoActiveConfig;
    };
    if !config.channel_enabled(channel) {
        return GateDecision::ChannelDisabled;
    }
    if let Some(hours) = &config.working_hours
        && !hours.contains(now)
    {
        return GateDecision::OutsideHours;
    }
    GateDecision::Proceed
}

/// Subject line for the outbound reply. Email replies quote the original
/// subject; WhatsApp has no subject.
fn reply_subject(message: &Message) -> Option<String> {
    match message.channel {
        Channel::Email => Some(match &message.subject {
            Some(s) if !s.trim().is_empty() => {
                let trimmed = s.trim();
                if trimmed.to_lowercase().starts_with("re:") {
                    trimmed.to_string()
                } else {
                    format!("Re: {trimmed}")
                }
            }
            _ => "Automatic reply".to_string(),
        }),
        Channel::Whatsapp => None,
    }
}

/// Drives gate checks, classification, generation and dispatch for each
/// message, updating its status as it goes.
pub struct AutoReplyOrchestrator {
    messages: MessageStore,
    bot_configs: BotConfigStore,
    templates: TemplateStore,
    intents: IntentStore,
    responses: ResponseStore,
    accounts: AccountStore,
    classifier: IntentClassifier,
    generator: ResponseGenerator,
    adapters: AdapterRegistry,
    send_timeout: Duration,
    shutdown: Arc<AtomicBool>,
}

impl AutoReplyOrchestrator {
    pub fn new(
        db: Arc<Database>,
        llm: Option<Arc<dyn LlmProvider>>,
        adapters: AdapterRegistry,
        config: PipelineConfig,
    ) -> Self {
        let intents = IntentStore::new(Arc::clone(&db));
        Self {
            messages: MessageStore::new(Arc::clone(&db)),
            bot_configs: BotConfigStore::new(Arc::clone(&db)),
            templates: TemplateStore::new(Arc::clone(&db)),
            intents: intents.clone(),
            responses: ResponseStore::new(Arc::clone(&db)),
            accounts: AccountStore::new(db),
            classifier: IntentClassifier::new(llm.clone(), intents, config.nlp_timeout),
            generator: ResponseGenerator::new(llm, config.nlp_timeout),
            adapters,
            send_timeout: config.send_timeout,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between batch iterations; set it to stop a run.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Ingest an inbound message delivered by a webhook or poller.
    ///
    /// The lookup key is the receiving address (email) or phone number
    /// (WhatsApp); it resolves the owning account case-insensitively.
    pub fn ingest(
        &self,
        lookup_key: &str,
        channel: Channel,
        sender: &str,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
    ) -> Result<Message, Error> {
        let owner = self
            .accounts
            .resolve_owner(channel, lookup_key)?
            .ok_or_else(|| {
                Error::Pipeline(PipelineError::UnknownAccount {
                    key: lookup_key.to_string(),
                })
            })?;

        let message = self.messages.insert(
            &owner,
            channel,
            sender,
            recipient,
            subject,
            body,
            None,
            Utc::now(),
        )?;
        info!(
            id = %message.id,
            owner = %owner,
            channel = %channel,
            sender = sender,
            "Inbound message ingested"
        );
        Ok(message)
    }

    /// Process one message by id and return its resulting status.
    pub async fn process_one(&self, message_id: &str) -> Result<MessageStatus, Error> {
        let message = self.messages.get(message_id)?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound {
                entity: "message".into(),
                id: message_id.into(),
            })
        })?;
        self.handle(message).await
    }

    /// Process every `received` message across owners.
    ///
    /// Per-message faults are logged and skipped; the run is best-effort.
    /// Returns the number of messages that reached `replied`.
    pub async fn process_pending(&self) -> usize {
        let pending = match self.messages.pending() {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "Failed to load pending messages");
                return 0;
            }
        };
        if pending.is_empty() {
            return 0;
        }
        info!(count = pending.len(), "Processing pending messages");

        let mut replied = 0;
        for message in pending {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Batch cancelled before completion");
                break;
            }
            let id = message.id.clone();
            match self.handle(message).await {
                Ok(MessageStatus::Replied) => replied += 1,
                Ok(status) => debug!(id = %id, status = status.as_str(), "Message settled"),
                Err(e) => error!(id = %id, error = %e, "Failed to process message"),
            }
        }

        info!(replied, "Pending drain complete");
        replied
    }

    /// Fetch unread mail for every active email account and ingest it,
    /// deduplicating on the channel-native message id.
    pub async fn fetch_new_mail(&self) -> usize {
        let accounts = match self.accounts.active_email_accounts() {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(error = %e, "Failed to load email accounts");
                return 0;
            }
        };
        let Some(adapter) = self.adapters.get(Channel::Email) else {
            debug!("No email adapter registered, skipping mail fetch");
            return 0;
        };

        let mut ingested = 0;
        for account in accounts {
            let owner = account.owner.clone();
            let address = account.address.clone();
            let dispatch = DispatchAccount::Email(account);

            let fetched = match adapter.fetch_unread(&dispatch).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    error!(account = %address, error = %e, "Mail fetch failed");
                    continue;
                }
            };

            for raw in fetched {
                match self.messages.find_by_external_id(&raw.external_id) {
                    Ok(Some(_)) => continue,
                    Ok(None) => {}
                    Err(e) => {
                        error!(external_id = %raw.external_id, error = %e, "Dedup lookup failed");
                        continue;
                    }
                }
                match self.messages.insert(
                    &owner,
                    Channel::Email,
                    &raw.sender,
                    &raw.recipient,
                    raw.subject.as_deref(),
                    &raw.body,
                    Some(&raw.external_id),
                    raw.received_at,
                ) {
                    Ok(message) => {
                        debug!(id = %message.id, sender = %raw.sender, "Fetched email ingested");
                        ingested += 1;
                    }
                    Err(e) => {
                        warn!(external_id = %raw.external_id, error = %e, "Failed to ingest email")
                    }
                }
            }
        }
        ingested
    }

    /// Run the state machine for one message.
    async fn handle(&self, message: Message) -> Result<MessageStatus, Error> {
        if message.status != MessageStatus::Received {
            return Ok(message.status);
        }

        let config = self.bot_configs.active_for(&message.owner)?;
        let decision = evaluate_gate(config.as_ref(), message.channel, Local::now().time());
        if decision != GateDecision::Proceed {
            info!(
                id = %message.id,
                owner = %message.owner,
                gate = decision.label(),
                "Message left for manual handling"
            );
            return Ok(MessageStatus::Received);
        }

        // Atomic claim: from here on this worker owns the message and it
        // will end in a terminal state.
        if !self.messages.claim(&message.id, Utc::now())? {
            let current = self
                .messages
                .get(&message.id)?
                .map(|m| m.status)
                .unwrap_or(message.status);
            debug!(id = %message.id, "Message already claimed by another worker");
            return Ok(current);
        }

        let catalog = self.intents.all()?;
        let ranked = self.classifier.classify(&message, &catalog).await;
        let templates = self.templates.for_owner(&message.owner)?;
        let reply = self
            .generator
            .generate(&message, &ranked, &templates, &catalog)
            .await;

        let Some(account) = self.dispatch_account(&message)? else {
            warn!(
                id = %message.id,
                owner = %message.owner,
                channel = %message.channel,
                "No active dispatch account"
            );
            self.messages.mark_failed(&message.id)?;
            return Ok(MessageStatus::Failed);
        };
        let Some(adapter) = self.adapters.get(message.channel) else {
            warn!(id = %message.id, channel = %message.channel, "No adapter registered");
            self.messages.mark_failed(&message.id)?;
            return Ok(MessageStatus::Failed);
        };

        let subject = reply_subject(&message);
        let send = adapter.send(
            &account,
            &message.sender,
            subject.as_deref(),
            &reply.content,
        );
        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(Ok(())) => {
                self.responses
                    .insert(&message.id, &reply.content, reply.template_id)?;
                self.messages.mark_replied(&message.id)?;
                info!(
                    id = %message.id,
                    channel = %message.channel,
                    to = %message.sender,
                    template = ?reply.template_id,
                    "Reply dispatched"
                );
                Ok(MessageStatus::Replied)
            }
            Ok(Err(e)) => {
                error!(id = %message.id, error = %e, "Dispatch failed");
                self.messages.mark_failed(&message.id)?;
                Ok(MessageStatus::Failed)
            }
            Err(_) => {
                let e = ChannelError::Timeout {
                    channel: message.channel,
                    timeout: self.send_timeout,
                };
                error!(id = %message.id, error = %e, "Dispatch timed out");
                self.messages.mark_failed(&message.id)?;
                Ok(MessageStatus::Failed)
            }
        }
    }

    /// The owner's active account for the message's channel, lowest id.
    fn dispatch_account(
        &self,
        message: &Message,
    ) -> Result<Option<DispatchAccount>, rusqlite::Error> {
        Ok(match message.channel {
            Channel::Email => self
                .accounts
                .active_email_for(&message.owner)?
                .map(DispatchAccount::Email),
            Channel::Whatsapp => self
                .accounts
                .active_whatsapp_for(&message.owner)?
                .map(DispatchAccount::WhatsApp),
        })
    }

    // Store accessors for wiring and tests.

    pub fn message_store(&self) -> &MessageStore {
        &self.messages
    }

    pub fn intent_store(&self) -> &IntentStore {
        &self.intents
    }

    pub fn response_store(&self) -> &ResponseStore {
        &self.responses
    }
}

// ── Tests ───────────────────────────────────────────────────────────
