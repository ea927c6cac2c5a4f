// src/notify/mod.rs
pub mod format;
pub mod telegram;

use std::time::Duration;

use metrics::counter;

use crate::config::Settings;

/// Transport-level outcome the notifier branches on.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Push channel. One call = one delivery attempt, no internal retries.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, destination: &str, text: &str) -> Result<(), TransportError>;
    fn name(&self) -> &'static str;
}

/// Logs instead of sending; used when no channel credentials are configured.
pub struct DryRunTransport;

#[async_trait::async_trait]
impl Transport for DryRunTransport {
    async fn send(&self, destination: &str, text: &str) -> Result<(), TransportError> {
        tracing::info!(%destination, "dry run, not sent:\n{text}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotifierCfg {
    /// Successful sends allowed per run, across all sources.
    pub max_per_run: usize,
    /// Rate-limited retries per message.
    pub max_retries: u8,
    /// Upper bound on a single retry-after wait.
    pub max_wait: Duration,
}

impl NotifierCfg {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            max_per_run: s.max_new_per_run,
            max_retries: s.notify_max_retries,
            max_wait: s.max_retry_wait(),
        }
    }
}

/// Rate-capped notifier shared by every source of one run.
pub struct Notifier {
    transport: Box<dyn Transport>,
    destination: String,
    cfg: NotifierCfg,
    sent: usize,
}

impl Notifier {
    pub fn new(transport: Box<dyn Transport>, destination: impl Into<String>, cfg: NotifierCfg) -> Self {
        Self {
            transport,
            destination: destination.into(),
            cfg,
            sent: 0,
        }
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn cap_reached(&self) -> bool {
        self.sent >= self.cfg.max_per_run
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Deliver one message. Rate limits are waited out up to `max_retries` times;
    /// hard failures return immediately.
    pub async fn notify(&mut self, text: &str) -> Result<(), TransportError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.transport.send(&self.destination, text).await {
                Ok(()) => {
                    self.sent += 1;
                    counter!("watch_notifications_sent_total").increment(1);
                    return Ok(());
                }
                Err(TransportError::RateLimited { retry_after }) if attempt <= self.cfg.max_retries => {
                    let wait = retry_after.min(self.cfg.max_wait);
                    tracing::warn!(
                        transport = self.transport.name(),
                        attempt,
                        ?wait,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    counter!("watch_notifications_failed_total").increment(1);
                    return Err(e);
                }
            }
        }
    }
}
