//! Telegram Bot API delivery.
//!
//! [`TelegramDelivery`] posts plain-text messages to a single chat through
//! `sendMessage`. A message counts as delivered only when the API answers
//! with a 2xx status and `"ok": true`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use soilwatch_core::error::CoreError;
use soilwatch_core::notify::Notifier;

/// Default Bot API base URL.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// A required environment variable is missing or malformed.
    #[error("{0}")]
    Config(String),

    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The Bot API returned a non-2xx status code.
    #[error("Telegram returned HTTP {0}")]
    HttpStatus(u16),

    /// The Bot API answered `"ok": false`.
    #[error("Telegram rejected message: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Bot credentials and destination chat.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
    pub api_url: String,
}

impl TelegramConfig {
    /// Load from `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID` (both required)
    /// and `TELEGRAM_API_URL`.
    pub fn from_env() -> Result<Self, TelegramError> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TelegramError::Config("TELEGRAM_BOT_TOKEN is required".into()))?;

        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|id| *id != 0)
            .ok_or_else(|| TelegramError::Config("TELEGRAM_CHAT_ID is required".into()))?;

        let api_url = soilwatch_core::env::string_or("TELEGRAM_API_URL", DEFAULT_API_URL);

        Ok(Self {
            bot_token,
            chat_id,
            api_url,
        })
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_url.trim_end_matches('/'),
            self.bot_token
        )
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("api_url", &self.api_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TelegramDelivery
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends alert text to the configured Telegram chat.
pub struct TelegramDelivery {
    client: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramDelivery {
    pub fn new(config: TelegramConfig) -> Result<Self, TelegramError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn chat_id(&self) -> i64 {
        self.config.chat_id
    }

    /// Post one message. No retry: the alert engine leaves the cooldown
    /// untouched on failure, so the next reading tries again.
    pub async fn send_message(&self, text: &str) -> Result<(), TelegramError> {
        let response = self
            .client
            .post(self.config.send_message_url())
            .json(&SendMessage {
                chat_id: self.config.chat_id,
                text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelegramError::HttpStatus(status.as_u16()));
        }

        let body: ApiResponse = response.json().await?;
        if !body.ok {
            return Err(TelegramError::Rejected(
                body.description.unwrap_or_else(|| "unknown error".into()),
            ));
        }

        tracing::debug!(chat_id = self.config.chat_id, "Telegram message delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramDelivery {
    async fn send_text(&self, text: &str) -> Result<(), CoreError> {
        self.send_message(text).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to send Telegram alert");
            CoreError::Notification(e.to_string())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
