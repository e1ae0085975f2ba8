// SPDX-License-Identifier: GPL-3.0-only
use thiserror::Error;

/// Failures of a photo search request.
///
/// Every variant is retryable by the user re-triggering the sync; none is fatal.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Network unreachable, connection reset, timeout.
    #[error("Could not reach the photo service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Photo service returned HTTP {status}")]
    HttpStatus { status: u16 },

    /// Body missing, not JSON, or missing required keys.
    #[error("Could not parse the photo service response: {0}")]
    Parse(String),

    /// Flickr answered with `stat` other than "ok".
    #[error("Photo service reported an error: {message}")]
    Api { code: Option<i64>, message: String },
}
