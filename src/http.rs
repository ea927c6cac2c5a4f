//! Shared HTTP client with retry-with-backoff on transient failures.
//!
//! One instance lives in the [`RunContext`](crate::context::RunContext) and is reused
//! by every source so connections are pooled. Transient means: network error,
//! HTTP 429, or any 5xx. Backoff doubles from `retry_base` per attempt; a numeric
//! `Retry-After` header overrides it (bounded by `max_wait`).

use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

use crate::config::Settings;

#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u8,
    retry_base: Duration,
    max_wait: Duration,
}

impl HttpClient {
    pub fn from_settings(s: &Settings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&s.accept_language).context("invalid accept_language")?,
        );
        let client = Client::builder()
            .user_agent(s.user_agent.as_str())
            .default_headers(headers)
            .timeout(s.request_timeout())
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            max_retries: s.http_max_retries,
            retry_base: s.retry_base(),
            max_wait: s.max_retry_wait(),
        })
    }

    /// Underlying pooled client, for POST-style callers (notification transports).
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET with retries. Non-transient statuses (e.g. 404) are returned, not raised.
    pub async fn get(&self, url: &str, query: &[(String, String)]) -> Result<Fetched> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self.client.get(url).query(query).send().await;
            match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if is_transient(status) && attempt <= self.max_retries {
                        let wait = retry_after(&rsp)
                            .unwrap_or_else(|| self.backoff(attempt))
                            .min(self.max_wait);
                        tracing::debug!(%url, %status, attempt, ?wait, "transient http status, retrying");
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    let body = rsp
                        .text()
                        .await
                        .with_context(|| format!("reading body of {url}"))?;
                    return Ok(Fetched { status, body });
                }
                Err(e) => {
                    if attempt <= self.max_retries {
                        tracing::debug!(%url, error = %e, attempt, "http request failed, retrying");
                        tokio::time::sleep(self.backoff(attempt)).await;
                        continue;
                    }
                    return Err(anyhow!("GET {url} failed: {e}"));
                }
            }
        }
    }

    /// GET expecting 2xx; anything else is an error.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let f = self.get(url, &[]).await?;
        if !f.status.is_success() {
            return Err(anyhow!("GET {url}: HTTP {}", f.status));
        }
        Ok(f.body)
    }

    /// Like [`get_text`](Self::get_text) but a 404 is `Ok(None)`.
    pub async fn get_optional(&self, url: &str) -> Result<Option<String>> {
        let f = self.get(url, &[]).await?;
        if f.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !f.status.is_success() {
            return Err(anyhow!("GET {url}: HTTP {}", f.status));
        }
        Ok(Some(f.body))
    }

    fn backoff(&self, attempt: u8) -> Duration {
        let factor = 1u32 << u32::from(attempt.saturating_sub(1)).min(16);
        self.retry_base.saturating_mul(factor).min(self.max_wait)
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// The resource no longer exists, as opposed to being temporarily unavailable.
pub fn is_gone(status: StatusCode) -> bool {
    matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE)
}

/// Numeric `Retry-After` (seconds). HTTP-date forms are ignored.
pub(crate) fn retry_after(rsp: &Response) -> Option<Duration> {
    rsp.headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
