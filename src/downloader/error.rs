// SPDX-License-Identifier: GPL-3.0-only
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Transport error downloading {url}: {source}")]
    Transport {
        url: String,
        source: reqwest::Error,
    },

    #[error("HTTP error {status} downloading {url}")]
    HttpStatus { status: u16, url: String },
}

impl DownloadError {
    /// Server errors, rate limits and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Transport { .. } => true,
            DownloadError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
        }
    }
}
