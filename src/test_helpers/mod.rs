// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::cache::ImageCache;
use crate::downloader::{DownloadError, Downloader};
use crate::search::{PhotoSearch, SearchError, SearchResult};
use crate::store::{Pin, SqliteStore};

/// Create a store backed by a database and image cache inside a temporary directory
pub async fn setup_test_store() -> (tempfile::TempDir, SqliteStore) {
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let cache = ImageCache::new(temp_dir.path().join("images"))
        .await
        .expect("Failed to create image cache");
    let store = SqliteStore::new(&temp_dir.path().join("test.db"), cache)
        .await
        .expect("Failed to open test store");
    (temp_dir, store)
}

/// `count` distinct remote image URLs sharing a name prefix
pub fn photo_urls(prefix: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("https://farm.example.com/1/{}{}_m.jpg", prefix, i))
        .collect()
}

/// Photo search returning scripted results in order.
#[derive(Default)]
pub struct FakeSearch {
    results: Mutex<VecDeque<Result<SearchResult, String>>>,
    hints: Mutex<Vec<Option<u32>>>,
    calls: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: Result<SearchResult, String>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn push_ok(&self, urls: Vec<String>, total_pages: u32) {
        self.push(Ok(SearchResult { urls, total_pages }));
    }

    pub fn push_err(&self, message: &str) {
        self.push(Err(message.to_string()));
    }

    /// Block searches until permits are added to the returned semaphore
    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn hints(&self) -> Vec<Option<u32>> {
        self.hints.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhotoSearch for FakeSearch {
    async fn search_photos(&self, _pin: &Pin, page_hint: Option<u32>) -> Result<SearchResult, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hints.lock().unwrap().push(page_hint);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }

        let next = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted search result".to_string()));
        next.map_err(|message| SearchError::Api { code: None, message })
    }
}

/// Downloader serving bytes from an in-memory map; unknown URLs are 404s.
#[derive(Default)]
pub struct FakeDownloader {
    images: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, bytes: &[u8]) {
        self.images.lock().unwrap().insert(url.to_string(), bytes.to_vec());
    }

    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn wait_for_calls(&self, count: usize) {
        for _ in 0..500 {
            if self.calls() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("downloader never reached {} calls", count);
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }

        self.images
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::HttpStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}
