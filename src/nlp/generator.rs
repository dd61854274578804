//! Reply generation.
//!
//! Combines the classifier's ranking with the template selection policy
//! and, when a model provider is configured, a short personalization
//! pass. Generation never fails outward and never returns empty text —
//! the worst case is a canned acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::llm::{CompletionRequest, LlmProvider};
use crate::nlp::FallbackReason;
use crate::nlp::classifier::RankedIntent;
use crate::nlp::selector::select_template;
use crate::store::catalog::Intent;
use crate::store::messages::Message;
use crate::store::templates::ResponseTemplate;

/// Minimum confidence for an intent to drive template selection.
/// Exactly 0.3 passes.
pub const CONFIDENCE_FLOOR: f64 = 0.3;

/// Max tokens for the personalization call (a short reply).
const GENERATE_MAX_TOKENS: u64 = 200;

/// Temperature for reply generation.
const GENERATE_TEMPERATURE: f64 = 0.7;

/// Generic acknowledgements used when nothing better is available.
pub const CANNED_REPLIES: [&str; 4] = [
    "Thank you for your message. I will handle it as soon as possible.",
    "I have received your message and will get back to you shortly.",
    "Your message has been recorded. I will contact you soon.",
    "Thank you for reaching out. I am looking into your request.",
];

/// A generated reply and the template it was based on, if any.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub content: String,
    pub template_id: Option<i64>,
}

/// Turns a classified message into final reply text.
pub struct ResponseGenerator {
    llm: Option<Arc<dyn LlmProvider>>,
    timeout: Duration,
}

impl ResponseGenerator {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Produce reply text for a message.
    ///
    /// `templates` must be the owner's templates in catalog order.
    pub async fn generate(
        &self,
        message: &Message,
        ranked: &[RankedIntent],
        templates: &[ResponseTemplate],
        catalog: &[Intent],
    ) -> GeneratedReply {
        let top = ranked.first().filter(|r| r.confidence >= CONFIDENCE_FLOOR);
        let template = select_template(
            templates,
            catalog,
            message.channel,
            top.map(|r| &r.intent),
        );

        if let Some(llm) = &self.llm {
            match self.personalize(llm, message, top, template).await {
                Ok(content) => {
                    return GeneratedReply {
                        content,
                        template_id: template.map(|t| t.id),
                    };
                }
                Err(reason) => {
                    debug!(
                        id = %message.id,
                        reason = %reason,
                        "Model generation unavailable, using deterministic reply"
                    );
                }
            }
        }

        deterministic_reply(top, template)
    }

    /// Model-backed personalization. Every failure mode routes to the
    /// deterministic reply via an explicit reason.
    async fn personalize(
        &self,
        llm: &Arc<dyn LlmProvider>,
        message: &Message,
        top: Option<&RankedIntent>,
        template: Option<&ResponseTemplate>,
    ) -> Result<String, FallbackReason> {
        let request = CompletionRequest::new(
            "You are an assistant that answers customer messages on behalf \
             of a business. Be professional, courteous and concise — at \
             most three or four sentences.",
            build_generate_prompt(message, top, template),
        )
        .with_max_tokens(GENERATE_MAX_TOKENS)
        .with_temperature(GENERATE_TEMPERATURE);

        let reply = match tokio::time::timeout(self.timeout, llm.complete(request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(FallbackReason::Request(e.to_string())),
            Err(_) => return Err(FallbackReason::Timeout),
        };

        if reply.trim().is_empty() {
            return Err(FallbackReason::Unparseable("empty completion".into()));
        }
        Ok(reply)
    }
}

// ── Deterministic fallback ──────────────────────────────────────────

fn deterministic_reply(
    top: Option<&RankedIntent>,
    template: Option<&ResponseTemplate>,
) -> GeneratedReply {
    if let Some(template) = template {
        return GeneratedReply {
            content: template.content.clone(),
            template_id: Some(template.id),
        };
    }

    if let Some(top) = top
        && let Some(ack) = intent_acknowledgement(&top.intent.name)
    {
        return GeneratedReply {
            content: ack.to_string(),
            template_id: None,
        };
    }

    let pick = rand::thread_rng().gen_range(0..CANNED_REPLIES.len());
    GeneratedReply {
        content: CANNED_REPLIES[pick].to_string(),
        template_id: None,
    }
}

/// Stock acknowledgements for the well-known intents.
fn intent_acknowledgement(name: &str) -> Option<&'static str> {
    match name {
        "greeting" => Some("Hello! Thanks for getting in touch. How can I help you today?"),
        "question" => Some(
            "Thank you for your question. I will look into it and get back to you \
             as soon as possible.",
        ),
        "problem" => Some(
            "I'm sorry to hear you are running into a problem. Could you share a \
             few more details so I can help?",
        ),
        "thanks" => {
            Some("You're welcome! Don't hesitate to reach out if you have any other questions.")
        }
        "appointment" => {
            Some("I'd be happy to set up an appointment with you. What times work for you?")
        }
        _ => None,
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_generate_prompt(
    message: &Message,
    top: Option<&RankedIntent>,
    template: Option<&ResponseTemplate>,
) -> String {
    let mut prompt = String::with_capacity(512);

    prompt.push_str(&format!("Channel: {}\n", message.channel));
    prompt.push_str(&format!("From: {}\n", message.sender));
    if let Some(subject) = &message.subject {
        prompt.push_str(&format!("Subject: {subject}\n"));
    }
    match top {
        Some(top) => prompt.push_str(&format!(
            "Detected intent: {} (confidence {:.2})\n",
            top.intent.name, top.confidence
        )),
        None => prompt.push_str("Detected intent: unknown\n"),
    }

    prompt.push_str(&format!("\nMessage:\n{}\n", message.body));

    match template {
        Some(template) => prompt.push_str(&format!(
            "\nUse this reply template as a style guide, adapting it to the \
             message:\n{}\n",
            template.content
        )),
        None => prompt.push_str(
            "\nWrite a short, helpful reply that acknowledges the message and \
             says what happens next.\n",
        ),
    }

    prompt
}

// ── Tests ───────────────────────────────────────────────────────────
