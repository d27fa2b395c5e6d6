// src/notify/mod.rs
use anyhow::Result;

pub mod telegram;

pub use telegram::TelegramNotifier;

/// Delivers a finished text message to a destination (chat id, channel).
#[async_trait::async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(&self, destination: &str, text: &str) -> Result<()>;
}
