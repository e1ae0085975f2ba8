// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::search::bbox::BoundingBox;
use crate::search::error::SearchError;
use crate::search::traits::{PhotoSearch, SearchResult};
use crate::store::models::Pin;

const SEARCH_METHOD: &str = "flickr.photos.search";
const EXTRAS: &str = "url_m";
const SAFE_SEARCH: &str = "1";
const CONTENT_TYPE: &str = "1";
const DATA_FORMAT: &str = "json";
const NO_JSON_CALLBACK: &str = "1";

/// Tunables for building a search query.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub api_key: String,
    pub per_page: u32,
    pub page_limit: u32,
    pub half_width: f64,
    pub half_height: f64,
}

impl SearchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.search_api_key.clone(),
            per_page: config.photos_per_page,
            page_limit: config.page_limit,
            half_width: config.bbox_half_width,
            half_height: config.bbox_half_height,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone)]
pub struct FlickrClient {
    client: Client,
    base_url: String,
    settings: SearchSettings,
}

impl FlickrClient {
    pub fn new(base_url: String, settings: SearchSettings, timeout: Duration) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("VirtualTouristDaemon/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            settings,
        })
    }

    fn query_params(&self, pin: &Pin, page: u32) -> Vec<(&'static str, String)> {
        let bbox = BoundingBox::around(
            pin.latitude,
            pin.longitude,
            self.settings.half_width,
            self.settings.half_height,
        );

        vec![
            ("method", SEARCH_METHOD.to_string()),
            ("api_key", self.settings.api_key.clone()),
            ("lat", pin.latitude.to_string()),
            ("lon", pin.longitude.to_string()),
            ("bbox", bbox.to_string()),
            ("safe_search", SAFE_SEARCH.to_string()),
            ("content_type", CONTENT_TYPE.to_string()),
            ("extras", EXTRAS.to_string()),
            ("format", DATA_FORMAT.to_string()),
            ("nojsoncallback", NO_JSON_CALLBACK.to_string()),
            ("per_page", self.settings.per_page.to_string()),
            ("page", page.to_string()),
        ]
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    stat: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    photos: Option<PhotosPage>,
}

#[derive(Deserialize)]
struct PhotosPage {
    pages: u32,
    #[serde(default)]
    photo: Vec<PhotoEntry>,
}

#[derive(Deserialize)]
struct PhotoEntry {
    url_m: Option<String>,
}

#[async_trait]
impl PhotoSearch for FlickrClient {
    async fn search_photos(&self, pin: &Pin, page_hint: Option<u32>) -> Result<SearchResult, SearchError> {
        let page = pick_page(&mut rand::thread_rng(), page_hint, self.settings.page_limit);
        info!(pin_id = pin.id, page, "Searching photos");

        let response = self
            .client
            .get(&self.base_url)
            .query(&self.query_params(pin, page))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(pin_id = pin.id, status = %status, "Photo search returned non-success status");
            return Err(SearchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let result = parse_search_body(&body)?;
        let urls = sample_urls(
            &mut rand::thread_rng(),
            result.urls,
            self.settings.per_page as usize,
        );

        info!(pin_id = pin.id, count = urls.len(), total_pages = result.total_pages, "Photo search completed");
        Ok(SearchResult {
            urls,
            total_pages: result.total_pages,
        })
    }
}

/// Decode a `flickr.photos.search` JSON body into the full URL list.
fn parse_search_body(body: &str) -> Result<SearchResult, SearchError> {
    if body.trim().is_empty() {
        return Err(SearchError::Parse("empty response body".to_string()));
    }

    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Parse(e.to_string()))?;

    if response.stat != "ok" {
        return Err(SearchError::Api {
            code: response.code,
            message: response
                .message
                .unwrap_or_else(|| format!("stat = {}", response.stat)),
        });
    }

    let photos = response
        .photos
        .ok_or_else(|| SearchError::Parse("missing 'photos' in response".to_string()))?;

    let urls: Vec<String> = photos.photo.into_iter().filter_map(|p| p.url_m).collect();
    debug!(returned = urls.len(), pages = photos.pages, "Parsed search response");

    Ok(SearchResult {
        urls,
        total_pages: photos.pages,
    })
}

/// Uniform page in `[1, min(page_hint, page_limit)]`; a missing hint means page 1.
pub(crate) fn pick_page<R: Rng + ?Sized>(rng: &mut R, page_hint: Option<u32>, page_limit: u32) -> u32 {
    let upper = page_hint.unwrap_or(1).min(page_limit).max(1);
    rng.gen_range(1..=upper)
}

/// Drop duplicate URLs, then keep a random subset of at most `max`.
pub(crate) fn sample_urls<R: Rng + ?Sized>(rng: &mut R, urls: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique: Vec<String> = urls.into_iter().filter(|u| seen.insert(u.clone())).collect();

    unique.shuffle(rng);
    unique.truncate(max);
    unique
}
