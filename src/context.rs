// src/context.rs
use anyhow::Result;

use crate::config::Settings;
use crate::http::HttpClient;

/// Explicit execution context handed to the runner and to every adapter call.
pub struct RunContext {
    pub http: HttpClient,
    pub settings: Settings,
}

impl RunContext {
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let http = HttpClient::from_settings(&settings)?;
        Ok(Self { http, settings })
    }

    /// Fixed pause between page fetches of one source.
    pub async fn pause_between_pages(&self) {
        let d = self.settings.page_delay();
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }

    /// Fixed pause between notifications.
    pub async fn pause_between_notifications(&self) {
        let d = self.settings.notify_delay();
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}
