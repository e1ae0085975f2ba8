// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::downloader::error::DownloadError;
use crate::downloader::traits::Downloader;

/// Image download client with bounded retries and exponential backoff.
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    backoff_base: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("VirtualTouristDaemon/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
        })
    }

    /// Delay before the second attempt; doubles for each one after.
    pub fn with_backoff(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let transport = |source| DownloadError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Downloader for HttpClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(bytes) => {
                    if attempt > 1 {
                        info!(url = %url, attempt, "Download succeeded after retry");
                    }
                    debug!(url = %url, bytes = bytes.len(), "Downloaded image");
                    return Ok(bytes);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    warn!(url = %url, attempt, error = %e, "Download attempt failed");
                    tokio::time::sleep(self.backoff_base * 2_u32.pow(attempt - 1)).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(url = %url, attempt, error = %e, "Download failed");
                    return Err(e);
                }
            }
        }
    }
}
