use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use reply_assist::channels::{AdapterRegistry, EmailAdapter, WhatsAppAdapter};
use reply_assist::config::PipelineConfig;
use reply_assist::llm::{LlmBackend, LlmConfig, create_provider};
use reply_assist::pipeline::{AutoReplyOrchestrator, spawn_poll_loop};
use reply_assist::store::{Database, IntentStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let db_path = std::env::var("REPLY_ASSIST_DB_PATH")
        .unwrap_or_else(|_| "./data/reply-assist.db".to_string());

    let poll_secs: u64 = std::env::var("REPLY_ASSIST_POLL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);

    eprintln!("📬 Reply Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", db_path);
    eprintln!("   Poll interval: {}s", poll_secs);

    // ── Model provider (optional — fallbacks cover its absence) ─────
    let llm = if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
        let model = std::env::var("REPLY_ASSIST_MODEL")
            .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
        eprintln!("   Model: {} (Anthropic)", model);
        Some(create_provider(&LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from(api_key),
            model,
        })?)
    } else if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        let model =
            std::env::var("REPLY_ASSIST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        eprintln!("   Model: {} (OpenAI)", model);
        Some(create_provider(&LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from(api_key),
            model,
        })?)
    } else {
        eprintln!("   Model: none (keyword classification + template replies)");
        None
    };

    // ── Database ────────────────────────────────────────────────────
    let db = Arc::new(Database::open(&db_path)?);

    // Make the keyword fallback useful on a fresh install
    IntentStore::new(Arc::clone(&db)).seed_defaults()?;

    // ── Channel adapters ────────────────────────────────────────────
    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::new(EmailAdapter::new()));
    adapters.register(Arc::new(WhatsAppAdapter::new()));
    eprintln!("   Channels: email, whatsapp\n");

    // ── Pipeline ────────────────────────────────────────────────────
    let config = PipelineConfig {
        poll_interval: Duration::from_secs(poll_secs),
        ..PipelineConfig::default()
    };
    let orchestrator = Arc::new(AutoReplyOrchestrator::new(
        db,
        llm,
        adapters,
        config.clone(),
    ));

    let poll_handle = spawn_poll_loop(Arc::clone(&orchestrator), config.poll_interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    orchestrator.shutdown_flag().store(true, Ordering::Relaxed);
    poll_handle.abort();

    Ok(())
}
