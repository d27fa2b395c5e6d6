// src/notify/telegram.rs
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use metrics::counter;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Deliver;
use crate::digest::MAX_MESSAGE_CHARS;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct TelegramNotifier {
    token: String,
    api_base: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        if self.token.trim().is_empty() {
            bail!("bot token not configured");
        }
        if chat_id.trim().is_empty() {
            bail!("chat ID not provided");
        }
        if text.is_empty() {
            bail!("message is empty");
        }
        let len = text.chars().count();
        if len > MAX_MESSAGE_CHARS {
            bail!("message too long ({len} characters, max {MAX_MESSAGE_CHARS})");
        }

        let payload = SendMessage {
            chat_id,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(self.endpoint())
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_server_error() && attempt < self.max_retries {
                        tracing::warn!(%status, attempt, "telegram server error, retrying");
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    let body: SendMessageResponse = match rsp.json().await {
                        Ok(body) => body,
                        Err(e) => {
                            counter!("telegram_send_errors_total").increment(1);
                            return Err(anyhow!("telegram response unreadable ({status}): {e}"));
                        }
                    };
                    if !body.ok {
                        counter!("telegram_send_errors_total").increment(1);
                        return Err(anyhow!(
                            "telegram API error: {}",
                            body.description.unwrap_or_else(|| status.to_string())
                        ));
                    }
                    counter!("telegram_messages_sent_total").increment(1);
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tracing::warn!(error = %e, attempt, "telegram request failed, retrying");
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    counter!("telegram_send_errors_total").increment(1);
                    return Err(anyhow!("telegram request failed: {e}"));
                }
            }
        }
    }
}

fn backoff(attempt: u8) -> Duration {
    Duration::from_millis(500u64 << (attempt - 1))
}

#[async_trait::async_trait]
impl Deliver for TelegramNotifier {
    async fn deliver(&self, destination: &str, text: &str) -> Result<()> {
        self.send_message(destination, text).await
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}
