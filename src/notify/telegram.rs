use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{Transport, TransportError};
use crate::http::retry_after;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API `sendMessage`; the destination is the chat id.
#[derive(Clone)]
pub struct TelegramTransport {
    client: Client,
    token: String,
    api_base: String,
}

impl TelegramTransport {
    pub fn new(client: Client, token: String) -> Self {
        Self {
            client,
            token,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point at a different API host (tests, self-hosted bot API).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// `TELEGRAM_BOT_TOKEN` + `TELEGRAM_CHAT_ID`; `None` when either is missing or blank.
    pub fn from_env(client: &Client) -> Option<(Self, String)> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        if token.trim().is_empty() || chat.trim().is_empty() {
            return None;
        }
        Some((Self::new(client.clone(), token.trim().to_string()), chat.trim().to_string()))
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize, Default)]
struct ApiError {
    #[serde(default)]
    parameters: Option<ApiErrorParams>,
}

#[derive(Deserialize)]
struct ApiErrorParams {
    retry_after: Option<u64>,
}

#[async_trait::async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, destination: &str, text: &str) -> Result<(), TransportError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.token
        );
        let payload = SendMessage {
            chat_id: destination,
            text,
            disable_web_page_preview: true,
        };

        // never let the token (part of the URL) reach logs
        let rsp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TransportError::Failed(format!("telegram request failed: {}", e.without_url())))?;

        let status = rsp.status();
        if status.is_success() {
            return Ok(());
        }
        let header_wait = retry_after(&rsp);
        let body = rsp.text().await.unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body_wait = serde_json::from_str::<ApiError>(&body)
                .ok()
                .and_then(|e| e.parameters)
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs);
            return Err(TransportError::RateLimited {
                retry_after: body_wait.or(header_wait).unwrap_or(Duration::from_secs(1)),
            });
        }

        let snippet: String = body.chars().take(200).collect();
        Err(TransportError::Failed(format!("telegram HTTP {status}: {snippet}")))
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
