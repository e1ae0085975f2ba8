// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::search::error::SearchError;
use crate::store::models::Pin;

/// One page of search results, already sampled down to the album size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Distinct photo URLs, order not guaranteed
    pub urls: Vec<String>,

    /// Total page count reported by the service; the next page hint
    pub total_pages: u32,
}

#[async_trait]
pub trait PhotoSearch: Send + Sync {
    /// Search photos around a pin. `page_hint` is the last known total page count.
    async fn search_photos(&self, pin: &Pin, page_hint: Option<u32>) -> Result<SearchResult, SearchError>;
}
