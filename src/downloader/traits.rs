// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;

use crate::downloader::error::DownloadError;

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch the bytes behind a remote image URL
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}
