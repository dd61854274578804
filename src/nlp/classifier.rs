//! Intent classification with a layered fallback strategy.
//!
//! Primary path: ask the model to pick one intent from the catalog and
//! return `"<intent_name>|<confidence>"`. Fallback path: score every
//! intent by the share of its keywords found in the message text. The
//! fallback is deterministic and always available; classification never
//! fails outward — the worst case is an empty ranking, which callers
//! treat as "unknown intent".

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::llm::{CompletionRequest, LlmProvider};
use crate::nlp::FallbackReason;
use crate::store::catalog::{Intent, IntentStore};
use crate::store::messages::Message;

/// Max tokens for the classification call (one name and one number).
const CLASSIFY_MAX_TOKENS: u64 = 50;

/// Temperature for classification (near-deterministic).
const CLASSIFY_TEMPERATURE: f64 = 0.3;

/// How much of the message body goes into the prompt.
const BODY_PREVIEW_CHARS: usize = 1000;

/// One classified intent with its confidence.
#[derive(Debug, Clone)]
pub struct RankedIntent {
    pub intent: Intent,
    pub confidence: f64,
}

/// Classifies message text against the intent catalog.
pub struct IntentClassifier {
    llm: Option<Arc<dyn LlmProvider>>,
    store: IntentStore,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>, store: IntentStore, timeout: Duration) -> Self {
        Self {
            llm,
            store,
            timeout,
        }
    }

    /// Rank the catalog against a message, highest confidence first.
    ///
    /// Every non-zero result is recorded as an intent link for the
    /// message — the primary path records only its single pick, the
    /// fallback records all ranked intents. Links are append-only.
    pub async fn classify(&self, message: &Message, catalog: &[Intent]) -> Vec<RankedIntent> {
        if catalog.is_empty() {
            debug!(id = %message.id, "Intent catalog is empty");
            return Vec::new();
        }

        let ranked = match self.classify_primary(&message.body, catalog).await {
            Ok(ranked) => ranked,
            Err(reason) => {
                debug!(
                    id = %message.id,
                    reason = %reason,
                    "Model classification unavailable, using keyword fallback"
                );
                keyword_rank(&message.body, catalog)
            }
        };

        self.record_links(&message.id, &ranked);
        ranked
    }

    /// Model-backed classification. Every failure mode routes to the
    /// fallback via an explicit reason.
    async fn classify_primary(
        &self,
        text: &str,
        catalog: &[Intent],
    ) -> Result<Vec<RankedIntent>, FallbackReason> {
        let Some(llm) = &self.llm else {
            return Err(FallbackReason::Unconfigured);
        };

        let request = CompletionRequest::new(
            "You classify customer messages by intent. \
             Answer with exactly one line and nothing else.",
            build_classify_prompt(text, catalog),
        )
        .with_max_tokens(CLASSIFY_MAX_TOKENS)
        .with_temperature(CLASSIFY_TEMPERATURE);

        let reply = match tokio::time::timeout(self.timeout, llm.complete(request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(FallbackReason::Request(e.to_string())),
            Err(_) => return Err(FallbackReason::Timeout),
        };

        let picked = parse_classify_reply(&reply, catalog)?;
        Ok(vec![picked])
    }

    fn record_links(&self, message_id: &str, ranked: &[RankedIntent]) {
        for r in ranked {
            if r.confidence <= 0.0 {
                continue;
            }
            if let Err(e) = self
                .store
                .record_link(message_id, r.intent.id, r.confidence)
            {
                warn!(
                    message_id = message_id,
                    intent = %r.intent.name,
                    error = %e,
                    "Failed to record intent link"
                );
            }
        }
    }
}

// ── Keyword fallback ────────────────────────────────────────────────

/// Deterministic keyword ranking.
///
/// Confidence per intent = matched keywords / total keywords, substring
/// match over the lower-cased text. Zero-confidence intents are dropped;
/// ties keep catalog order (stable sort).
pub fn keyword_rank(text: &str, catalog: &[Intent]) -> Vec<RankedIntent> {
    let text = text.to_lowercase();

    let mut ranked: Vec<RankedIntent> = catalog
        .iter()
        .filter_map(|intent| {
            let keywords = intent.keyword_list();
            if keywords.is_empty() {
                return None;
            }
            let matches = keywords.iter().filter(|k| text.contains(k.as_str())).count();
            if matches == 0 {
                return None;
            }
            Some(RankedIntent {
                intent: intent.clone(),
                confidence: matches as f64 / keywords.len() as f64,
            })
        })
        .collect();

    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked
}

// ── Prompt construction & parsing ───────────────────────────────────

fn build_classify_prompt(text: &str, catalog: &[Intent]) -> String {
    let mut prompt = String::with_capacity(512);
    prompt.push_str("Possible intents:\n");
    for intent in catalog {
        prompt.push_str(&format!("- {}: {}\n", intent.name, intent.description));
    }

    let preview: String = text.chars().take(BODY_PREVIEW_CHARS).collect();
    prompt.push_str(&format!("\nMessage:\n{preview}\n"));
    prompt.push_str(
        "\nReply with the best-matching intent name and a confidence \
         between 0 and 1, in the form: intent_name|confidence",
    );
    prompt
}

/// Parse a strict `"<intent_name>|<confidence>"` reply and resolve the
/// name against the catalog (case-insensitive substring, either way).
fn parse_classify_reply(
    raw: &str,
    catalog: &[Intent],
) -> Result<RankedIntent, FallbackReason> {
    let line = raw.trim().lines().next().unwrap_or("").trim();
    let mut parts = line.split('|');
    let (Some(name), Some(confidence), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FallbackReason::Unparseable(line.to_string()));
    };

    let confidence: f64 = confidence
        .trim()
        .parse()
        .map_err(|_| FallbackReason::Unparseable(line.to_string()))?;
    let confidence = confidence.clamp(0.0, 1.0);

    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return Err(FallbackReason::Unparseable(line.to_string()));
    }
    let intent = catalog
        .iter()
        .find(|i| {
            let cataloged = i.name.to_lowercase();
            cataloged.contains(&needle) || needle.contains(&cataloged)
        })
        .ok_or_else(|| FallbackReason::UnknownIntent(name.trim().to_string()))?;

    Ok(RankedIntent {
        intent: intent.clone(),
        confidence,
    })
}

// ── Tests ───────────────────────────────────────────────────────────
