//! Persistence layer — SQLite-backed storage for messages, catalogs, and accounts.

pub mod accounts;
pub mod bot_config;
pub mod catalog;
pub mod db;
pub mod messages;
pub mod responses;
pub mod templates;

pub use accounts::{AccountStore, EmailAccount, WhatsAppAccount};
pub use bot_config::{BotConfigStore, BotConfiguration, WorkingHours};
pub use catalog::{Intent, IntentCategory, IntentStore, MessageIntentLink};
pub use db::Database;
pub use messages::{Message, MessageStatus, MessageStore};
pub use responses::{MessageResponse, ResponseStore};
pub use templates::{ChannelScope, ResponseTemplate, TemplateStore};
