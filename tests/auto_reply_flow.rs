//! End-to-end pipeline scenarios over an in-memory store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;

use reply_assist::channels::{
    AdapterRegistry, Channel, ChannelAdapter, DispatchAccount, RawMessage,
};
use reply_assist::config::PipelineConfig;
use reply_assist::error::ChannelError;
use reply_assist::store::templates::ChannelScope;
use reply_assist::store::{
    AccountStore, BotConfigStore, Database, IntentStore, MessageStatus, ResponseStore,
    TemplateStore, WorkingHours,
};
use reply_assist::pipeline::AutoReplyOrchestrator;

#[derive(Debug, Clone)]
struct SentReply {
    recipient: String,
    subject: Option<String>,
    body: String,
}

/// Test adapter that records every send.
struct RecordingAdapter {
    channel: Channel,
    sent: Arc<Mutex<Vec<SentReply>>>,
}

#[async_trait]
impl ChannelAdapter for RecordingAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(
        &self,
        _account: &DispatchAccount,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
    ) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(SentReply {
            recipient: recipient.to_string(),
            subject: subject.map(String::from),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn fetch_unread(
        &self,
        _account: &DispatchAccount,
    ) -> Result<Vec<RawMessage>, ChannelError> {
        Ok(Vec::new())
    }
}

struct World {
    db: Arc<Database>,
    orchestrator: AutoReplyOrchestrator,
    sent: Arc<Mutex<Vec<SentReply>>>,
}

fn world() -> World {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let sent = Arc::new(Mutex::new(Vec::new()));
    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::new(RecordingAdapter {
        channel: Channel::Email,
        sent: Arc::clone(&sent),
    }));
    adapters.register(Arc::new(RecordingAdapter {
        channel: Channel::Whatsapp,
        sent: Arc::clone(&sent),
    }));

    let orchestrator = AutoReplyOrchestrator::new(
        Arc::clone(&db),
        None,
        adapters,
        PipelineConfig {
            poll_interval: Duration::from_secs(1),
            ..PipelineConfig::default()
        },
    );

    World {
        db,
        orchestrator,
        sent,
    }
}

impl World {
    fn add_config(&self, owner: &str, hours: Option<WorkingHours>) {
        BotConfigStore::new(Arc::clone(&self.db))
            .insert(owner, "bot", true, true, true, hours)
            .unwrap();
    }

    fn add_email_account(&self, owner: &str, address: &str) {
        AccountStore::new(Arc::clone(&self.db))
            .add_email_account(
                owner,
                address,
                "smtp.corp.test",
                587,
                "imap.corp.test",
                993,
                "user",
                "pass",
                true,
            )
            .unwrap();
    }
}

#[tokio::test]
async fn email_reply_flow_with_keyword_ranking() {
    let w = world();
    w.add_config("alice", None);
    w.add_email_account("alice", "support@corp.test");

    // Catalog: greeting has one keyword, pricing has two
    let intents = IntentStore::new(Arc::clone(&w.db));
    let general = intents.add_category("general", "Common inquiries").unwrap();
    let greeting = intents
        .add_intent(general, "greeting", "Opening a conversation", "hello")
        .unwrap();
    let sales = intents.add_category("sales", "Buying questions").unwrap();
    let pricing = intents
        .add_intent(sales, "pricing", "Asks about cost", "pricing, quote")
        .unwrap();

    // A template linked to the greeting category and a default
    let templates = TemplateStore::new(Arc::clone(&w.db));
    let greeting_template = templates
        .insert(
            "alice",
            "greeting reply",
            "Hello! How can we help you today?",
            ChannelScope::Email,
            false,
            Some(general),
        )
        .unwrap();
    templates
        .insert(
            "alice",
            "default",
            "Thanks, we'll be in touch.",
            ChannelScope::Both,
            true,
            None,
        )
        .unwrap();

    let msg = w
        .orchestrator
        .ingest(
            "support@corp.test",
            Channel::Email,
            "customer@example.com",
            "support@corp.test",
            Some("Pricing"),
            "Hello, I have a question about pricing",
        )
        .unwrap();

    let replied = w.orchestrator.process_pending().await;
    assert_eq!(replied, 1);

    // Keyword ranking: greeting 1/1 = 1.0 beats pricing 1/2 = 0.5,
    // so the greeting-linked template wins over the default.
    let links = intents.links_for(&msg.id).unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].intent_id, greeting);
    assert!((links[0].confidence - 1.0).abs() < f64::EPSILON);
    assert_eq!(links[1].intent_id, pricing);
    assert!((links[1].confidence - 0.5).abs() < f64::EPSILON);

    let sent = w.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "customer@example.com");
    assert_eq!(sent[0].subject.as_deref(), Some("Re: Pricing"));
    assert_eq!(sent[0].body, "Hello! How can we help you today?");

    let responses = ResponseStore::new(Arc::clone(&w.db))
        .for_message(&msg.id)
        .unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].template_id, Some(greeting_template));
}

#[tokio::test]
async fn whatsapp_reply_uses_scoped_template_without_subject() {
    let w = world();
    w.add_config("alice", None);
    AccountStore::new(Arc::clone(&w.db))
        .add_whatsapp_account(
            "alice",
            "+15550001111",
            "https://graph.facebook.com/v17.0",
            "12345",
            "token",
            true,
        )
        .unwrap();

    let templates = TemplateStore::new(Arc::clone(&w.db));
    templates
        .insert(
            "alice",
            "email only",
            "Email greeting",
            ChannelScope::Email,
            true,
            None,
        )
        .unwrap();
    templates
        .insert(
            "alice",
            "wa default",
            "Thanks for your WhatsApp message!",
            ChannelScope::Whatsapp,
            true,
            None,
        )
        .unwrap();

    let msg = w
        .orchestrator
        .ingest(
            "+15550001111",
            Channel::Whatsapp,
            "+15550002222",
            "+15550001111",
            None,
            "hola",
        )
        .unwrap();

    let status = w.orchestrator.process_one(&msg.id).await.unwrap();
    assert_eq!(status, MessageStatus::Replied);

    let sent = w.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "+15550002222");
    assert!(sent[0].subject.is_none());
    assert_eq!(sent[0].body, "Thanks for your WhatsApp message!");
}

#[tokio::test]
async fn missing_dispatch_account_fails_without_response() {
    let w = world();
    w.add_config("alice", None);
    w.add_email_account("alice", "support@corp.test");

    let msg = w
        .orchestrator
        .ingest(
            "support@corp.test",
            Channel::Email,
            "customer@example.com",
            "support@corp.test",
            None,
            "hello",
        )
        .unwrap();

    // The account disappears between ingestion and processing
    w.db.conn()
        .execute("UPDATE email_accounts SET active = 0", [])
        .unwrap();

    let status = w.orchestrator.process_one(&msg.id).await.unwrap();
    assert_eq!(status, MessageStatus::Failed);
    assert!(w.sent.lock().unwrap().is_empty());
    assert!(
        ResponseStore::new(Arc::clone(&w.db))
            .for_message(&msg.id)
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn outside_working_hours_leaves_message_for_later() {
    let w = world();
    // A zero-width window: no local time ever falls inside [start, end)
    let start = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
    w.add_config("alice", Some(WorkingHours { start, end: start }));
    w.add_email_account("alice", "support@corp.test");

    let msg = w
        .orchestrator
        .ingest(
            "support@corp.test",
            Channel::Email,
            "customer@example.com",
            "support@corp.test",
            None,
            "hello",
        )
        .unwrap();

    let replied = w.orchestrator.process_pending().await;
    assert_eq!(replied, 0);
    assert_eq!(
        w.orchestrator
            .message_store()
            .get(&msg.id)
            .unwrap()
            .unwrap()
            .status,
        MessageStatus::Received
    );
    assert!(w.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_intent_still_gets_a_reply() {
    let w = world();
    w.add_config("alice", None);
    w.add_email_account("alice", "support@corp.test");
    // No templates, no intents — worst case must still answer

    let msg = w
        .orchestrator
        .ingest(
            "support@corp.test",
            Channel::Email,
            "customer@example.com",
            "support@corp.test",
            None,
            "completely unclassifiable text",
        )
        .unwrap();

    let status = w.orchestrator.process_one(&msg.id).await.unwrap();
    assert_eq!(status, MessageStatus::Replied);

    let sent = w.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].body.is_empty());
}
