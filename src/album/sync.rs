// SPDX-License-Identifier: GPL-3.0-only
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::album::error::SyncError;
use crate::album::state::{Subscribers, Subscription, SubscriptionId, SyncEvent, SyncState};
use crate::cache::{CacheError, ImageCache};
use crate::downloader::Downloader;
use crate::search::PhotoSearch;
use crate::store::{Photo, PhotoStore, Pin, PinStore, StoreError};

/// Result of triggering an album sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "photos", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The pin's album after the call
    Populated(Vec<Photo>),

    /// A sync for this pin was already running; nothing was done
    AlreadyLoading,
}

const DEFAULT_ALBUM_LIMIT: usize = 21;

#[derive(Debug, Default)]
struct PinSync {
    state: SyncState,
    /// Bumped at the start of every sync; image downloads compare it on completion
    generation: u64,
    /// Pin was deleted mid-sync; the entry goes away once the sync settles
    deleted: bool,
}

/// Orchestrates photo search and the photo store to populate, refresh and prune
/// a pin's album. It is the only writer of a pin's photo set; at most one sync
/// per pin runs at a time.
pub struct AlbumSync {
    pins: Arc<dyn PinStore>,
    photos: Arc<dyn PhotoStore>,
    search: Arc<dyn PhotoSearch>,
    downloader: Arc<dyn Downloader>,
    cache: ImageCache,
    /// Most photos an album may hold through manual additions
    album_limit: usize,
    syncs: Mutex<HashMap<i64, PinSync>>,
    subscribers: Subscribers,
}

/// Marks a pin as Loading for as long as it lives. Dropped without `finish`
/// (the sync future was cancelled), it moves the pin to Failed.
struct InFlight<'a> {
    album: &'a AlbumSync,
    pin_id: i64,
    finished: bool,
}

impl InFlight<'_> {
    fn finish(mut self, state: SyncState) {
        self.finished = true;
        self.album.settle(self.pin_id, state);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(pin_id = self.pin_id, "Album sync cancelled");
            self.album.settle(
                self.pin_id,
                SyncState::Failed {
                    message: "sync cancelled".to_string(),
                },
            );
        }
    }
}

impl AlbumSync {
    pub fn new(
        pins: Arc<dyn PinStore>,
        photos: Arc<dyn PhotoStore>,
        search: Arc<dyn PhotoSearch>,
        downloader: Arc<dyn Downloader>,
        cache: ImageCache,
    ) -> Self {
        Self {
            pins,
            photos,
            search,
            downloader,
            cache,
            album_limit: DEFAULT_ALBUM_LIMIT,
            syncs: Mutex::new(HashMap::new()),
            subscribers: Subscribers::default(),
        }
    }

    pub fn with_album_limit(mut self, album_limit: usize) -> Self {
        self.album_limit = album_limit.max(1);
        self
    }

    pub fn subscribe(&self) -> Subscription {
        self.subscribers.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn state(&self, pin_id: i64) -> SyncState {
        self.lock_syncs()
            .get(&pin_id)
            .map(|s| s.state.clone())
            .unwrap_or_default()
    }

    /// Return the pin's album, fetching one if it is empty.
    pub async fn ensure_album(&self, pin_id: i64) -> Result<SyncOutcome, SyncError> {
        if self.state(pin_id) == SyncState::Loading {
            debug!(pin_id, "Album sync already in flight");
            return Ok(SyncOutcome::AlreadyLoading);
        }

        let existing = self.photos.list_photos(pin_id).await?;
        if !existing.is_empty() {
            self.mark_populated_if_idle(pin_id, existing.len());
            return Ok(SyncOutcome::Populated(existing));
        }

        self.run_sync(pin_id, false).await
    }

    /// Throw the current album away and fetch a fresh one.
    ///
    /// Photos are cleared before searching, so a failed search leaves the album
    /// empty rather than mixing old and new photos.
    pub async fn new_collection(&self, pin_id: i64) -> Result<SyncOutcome, SyncError> {
        self.run_sync(pin_id, true).await
    }

    async fn run_sync(&self, pin_id: i64, clear: bool) -> Result<SyncOutcome, SyncError> {
        let Some(flight) = self.begin(pin_id) else {
            info!(pin_id, "Ignoring sync trigger, already loading");
            return Ok(SyncOutcome::AlreadyLoading);
        };

        match self.populate(pin_id, clear).await {
            Ok(photos) => {
                info!(pin_id, count = photos.len(), "Album sync completed");
                flight.finish(SyncState::Populated {
                    count: photos.len(),
                });
                Ok(SyncOutcome::Populated(photos))
            }
            Err(e) => {
                match &e {
                    SyncError::Search(_) => warn!(pin_id, error = %e, "Album sync failed"),
                    _ => error!(pin_id, error = %e, "Album sync failed"),
                }
                flight.finish(SyncState::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn populate(&self, pin_id: i64, clear: bool) -> Result<Vec<Photo>, SyncError> {
        let pin = self
            .pins
            .get_pin(pin_id)
            .await?
            .ok_or(StoreError::PinNotFound(pin_id))?;

        if clear {
            self.photos.delete_all_photos(pin_id).await?;
        } else {
            // Another trigger may have filled the album before this one took the slot
            let existing = self.photos.list_photos(pin_id).await?;
            if !existing.is_empty() {
                debug!(pin_id, count = existing.len(), "Album already populated, skipping search");
                return Ok(existing);
            }
        }

        let result = self.search.search_photos(&pin, pin.pagination_cursor).await?;
        self.pins.set_pagination_cursor(pin_id, result.total_pages).await?;

        Ok(self.photos.add_photos(pin_id, &result.urls).await?)
    }

    /// Image bytes for a photo, from the cache or downloaded and cached.
    ///
    /// A download whose photo was deleted, or whose pin started or finished a
    /// sync meanwhile, is thrown away with `SyncError::StalePhoto`.
    pub async fn load_image(&self, photo_id: i64) -> Result<Vec<u8>, SyncError> {
        let photo = self
            .photos
            .get_photo(photo_id)
            .await?
            .ok_or(StoreError::PhotoNotFound(photo_id))?;

        if let Some(file) = &photo.local_file {
            match self.cache.read(file).await {
                Ok(Some(bytes)) => return Ok(bytes),
                Ok(None) => debug!(photo_id, file = %file, "Cached image missing, downloading again"),
                Err(e) => warn!(photo_id, error = %e, "Failed to read cached image"),
            }
        }

        let generation = match self.lock_syncs().get(&photo.pin_id) {
            Some(sync) if sync.state == SyncState::Loading => {
                return Err(SyncError::StalePhoto(photo_id));
            }
            Some(sync) => sync.generation,
            None => 0,
        };

        let bytes = self.downloader.fetch(&photo.remote_url).await?;

        if self.is_stale(photo.pin_id, generation) {
            debug!(photo_id, "Discarding image download for re-synced album");
            return Err(SyncError::StalePhoto(photo_id));
        }

        let file_name = cache_file_name(&photo)?;
        self.cache.write(&file_name, &bytes).await?;
        if !self.photos.set_local_file(photo_id, &file_name).await? {
            debug!(photo_id, "Discarding image download for deleted photo");
            self.cache.remove_best_effort(&file_name).await;
            return Err(SyncError::StalePhoto(photo_id));
        }

        Ok(bytes)
    }

    pub async fn add_pin(&self, latitude: f64, longitude: f64) -> Result<Pin, SyncError> {
        Ok(self.pins.add_pin(latitude, longitude).await?)
    }

    pub async fn get_pin(&self, pin_id: i64) -> Result<Pin, SyncError> {
        Ok(self
            .pins
            .get_pin(pin_id)
            .await?
            .ok_or(StoreError::PinNotFound(pin_id))?)
    }

    pub async fn list_pins(&self) -> Result<Vec<Pin>, SyncError> {
        Ok(self.pins.list_pins().await?)
    }

    /// Delete a pin, its photos and their cached files.
    ///
    /// A sync still running for the pin keeps its slot until it settles, so a
    /// concurrent trigger cannot start a second one.
    pub async fn delete_pin(&self, pin_id: i64) -> Result<(), SyncError> {
        self.pins.delete_pin(pin_id).await?;

        {
            let mut syncs = self.lock_syncs();
            let loading = syncs
                .get(&pin_id)
                .is_some_and(|s| s.state == SyncState::Loading);
            if loading {
                if let Some(sync) = syncs.get_mut(&pin_id) {
                    sync.deleted = true;
                }
            } else {
                syncs.remove(&pin_id);
            }
        }

        self.subscribers.emit(SyncEvent {
            pin_id,
            state: SyncState::Deleted,
        });
        Ok(())
    }

    /// Add one photo to a pin's album by URL. Refused while the album syncs or
    /// once it holds `album_limit` photos.
    pub async fn add_photo(&self, pin_id: i64, url: &str) -> Result<Photo, SyncError> {
        if self.state(pin_id) == SyncState::Loading {
            return Err(SyncError::SyncInProgress(pin_id));
        }
        if ImageCache::file_name_for(url).is_none() {
            return Err(CacheError::InvalidName(url.to_string()).into());
        }

        let count = self.photos.list_photos(pin_id).await?.len();
        if count >= self.album_limit {
            return Err(SyncError::AlbumFull {
                pin_id,
                limit: self.album_limit,
            });
        }

        let photo = self.photos.add_photo(pin_id, url).await?;
        self.refresh_count(pin_id).await?;
        Ok(photo)
    }

    /// Delete one photo. A populated album's count follows the deletion.
    pub async fn delete_photo(&self, photo_id: i64) -> Result<(), SyncError> {
        let photo = self.photos.delete_photo(photo_id).await?;
        self.refresh_count(photo.pin_id).await
    }

    /// Re-count a populated album after a manual edit and notify subscribers.
    async fn refresh_count(&self, pin_id: i64) -> Result<(), SyncError> {
        let count = self.photos.list_photos(pin_id).await?.len();

        let updated = {
            let mut syncs = self.lock_syncs();
            match syncs.get_mut(&pin_id) {
                Some(sync) if matches!(sync.state, SyncState::Populated { .. }) => {
                    sync.state = SyncState::Populated { count };
                    Some(sync.state.clone())
                }
                _ => None,
            }
        };

        if let Some(state) = updated {
            self.subscribers.emit(SyncEvent { pin_id, state });
        }
        Ok(())
    }

    fn begin(&self, pin_id: i64) -> Option<InFlight<'_>> {
        {
            let mut syncs = self.lock_syncs();
            let sync = syncs.entry(pin_id).or_default();
            if sync.state == SyncState::Loading {
                return None;
            }
            sync.state = SyncState::Loading;
            sync.generation += 1;
        }

        self.subscribers.emit(SyncEvent {
            pin_id,
            state: SyncState::Loading,
        });

        Some(InFlight {
            album: self,
            pin_id,
            finished: false,
        })
    }

    /// Record the end state of a sync and notify subscribers. A pin deleted
    /// mid-sync has its entry dropped instead.
    fn settle(&self, pin_id: i64, state: SyncState) {
        {
            let mut syncs = self.lock_syncs();
            if syncs.get(&pin_id).is_some_and(|s| s.deleted) {
                syncs.remove(&pin_id);
                debug!(pin_id, "Dropped sync state of deleted pin");
                return;
            }
            syncs.entry(pin_id).or_default().state = state.clone();
        }
        self.subscribers.emit(SyncEvent { pin_id, state });
    }

    fn mark_populated_if_idle(&self, pin_id: i64, count: usize) {
        let mut syncs = self.lock_syncs();
        let sync = syncs.entry(pin_id).or_default();
        if sync.state == SyncState::Idle {
            sync.state = SyncState::Populated { count };
        }
    }

    fn is_stale(&self, pin_id: i64, generation: u64) -> bool {
        match self.lock_syncs().get(&pin_id) {
            Some(sync) => sync.state == SyncState::Loading || sync.generation != generation,
            None => generation != 0,
        }
    }

    fn lock_syncs(&self) -> std::sync::MutexGuard<'_, HashMap<i64, PinSync>> {
        self.syncs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cache file for a photo: the URL's last path segment, prefixed with the pin id
/// so two pins sharing an image never share a file.
fn cache_file_name(photo: &Photo) -> Result<String, CacheError> {
    ImageCache::file_name_for(&photo.remote_url)
        .map(|name| format!("{}_{}", photo.pin_id, name))
        .ok_or_else(|| CacheError::InvalidName(photo.remote_url.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SearchError, SearchResult};
    use crate::store::SqliteStore;
    use crate::test_helpers::{photo_urls, setup_test_store, FakeDownloader, FakeSearch};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tempfile::TempDir;

    struct Harness {
        _temp_dir: TempDir,
        store: Arc<SqliteStore>,
        search: Arc<FakeSearch>,
        downloader: Arc<FakeDownloader>,
        album: Arc<AlbumSync>,
    }

    async fn setup() -> Harness {
        let (temp_dir, store) = setup_test_store().await;
        let store = Arc::new(store);
        let search = Arc::new(FakeSearch::new());
        let downloader = Arc::new(FakeDownloader::new());
        let album = Arc::new(AlbumSync::new(
            store.clone(),
            store.clone(),
            search.clone(),
            downloader.clone(),
            store.cache().clone(),
        ));
        Harness {
            _temp_dir: temp_dir,
            store,
            search,
            downloader,
            album,
        }
    }

    fn populated(outcome: SyncOutcome) -> Vec<Photo> {
        match outcome {
            SyncOutcome::Populated(photos) => photos,
            SyncOutcome::AlreadyLoading => panic!("expected a populated album"),
        }
    }

    async fn wait_for_state(album: &AlbumSync, pin_id: i64, state: SyncState) {
        for _ in 0..500 {
            if album.state(pin_id) == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("pin {} never reached {:?}", pin_id, state);
    }

    #[tokio::test]
    async fn test_first_view_populates_album() {
        let h = setup().await;
        let pin = h.store.add_pin(10.0, 20.0).await.unwrap();
        let urls = photo_urls("a", 7);
        h.search.push_ok(urls.clone(), 9);

        let photos = populated(h.album.ensure_album(pin.id).await.unwrap());

        assert_eq!(photos.len(), 7);
        let stored: HashSet<String> = h
            .store
            .list_photos(pin.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.remote_url)
            .collect();
        assert_eq!(stored, urls.into_iter().collect::<HashSet<_>>());
        assert_eq!(h.album.state(pin.id), SyncState::Populated { count: 7 });
        assert_eq!(h.store.get_pin(pin.id).await.unwrap().unwrap().pagination_cursor, Some(9));
    }

    #[tokio::test]
    async fn test_existing_album_skips_search() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.store.add_photos(pin.id, &photo_urls("a", 3)).await.unwrap();

        let photos = populated(h.album.ensure_album(pin.id).await.unwrap());

        assert_eq!(photos.len(), 3);
        assert_eq!(h.search.calls(), 0);
        assert_eq!(h.album.state(pin.id), SyncState::Populated { count: 3 });
    }

    #[tokio::test]
    async fn test_page_hint_passed_from_cursor() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.store.set_pagination_cursor(pin.id, 33).await.unwrap();
        h.search.push_ok(photo_urls("a", 1), 35);

        h.album.ensure_album(pin.id).await.unwrap();

        assert_eq!(h.search.hints(), vec![Some(33)]);
    }

    #[tokio::test]
    async fn test_failed_search_surfaces_error() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.search.push_err("Invalid API Key");

        let err = h.album.ensure_album(pin.id).await.unwrap_err();

        assert!(matches!(err, SyncError::Search(SearchError::Api { .. })));
        assert!(h.store.list_photos(pin.id).await.unwrap().is_empty());
        match h.album.state(pin.id) {
            SyncState::Failed { message } => assert!(message.contains("Invalid API Key")),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_refresh_then_success_keeps_only_second_results() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.store.add_photos(pin.id, &photo_urls("old", 5)).await.unwrap();

        h.search.push_err("service unavailable");
        assert!(h.album.new_collection(pin.id).await.is_err());
        assert!(h.store.list_photos(pin.id).await.unwrap().is_empty());

        let fresh = photo_urls("new", 4);
        h.search.push_ok(fresh.clone(), 2);
        populated(h.album.new_collection(pin.id).await.unwrap());

        let mut stored: Vec<String> = h
            .store
            .list_photos(pin.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.remote_url)
            .collect();
        stored.sort();
        let mut expected = fresh;
        expected.sort();
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn test_new_collection_removes_cached_files() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        let photo = h.store.add_photo(pin.id, "https://farm.example.com/1/old.jpg").await.unwrap();
        let path = h.store.cache().write("old.jpg", b"img").await.unwrap();
        h.store.set_local_file(photo.id, "old.jpg").await.unwrap();
        h.search.push_ok(photo_urls("new", 2), 1);

        populated(h.album.new_collection(pin.id).await.unwrap());

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_concurrent_triggers_issue_one_request() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.search.push_ok(photo_urls("a", 3), 1);
        let gate = h.search.hold();

        let album = h.album.clone();
        let pin_id = pin.id;
        let first = tokio::spawn(async move { album.ensure_album(pin_id).await });

        wait_for_state(&h.album, pin.id, SyncState::Loading).await;
        assert_eq!(h.album.ensure_album(pin.id).await.unwrap(), SyncOutcome::AlreadyLoading);
        assert_eq!(h.album.new_collection(pin.id).await.unwrap(), SyncOutcome::AlreadyLoading);

        gate.add_permits(1);
        let photos = populated(first.await.unwrap().unwrap());

        assert_eq!(photos.len(), 3);
        assert_eq!(h.search.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_sync_marks_failed() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.search.push_ok(photo_urls("a", 3), 1);
        let _gate = h.search.hold();

        let album = h.album.clone();
        let pin_id = pin.id;
        let task = tokio::spawn(async move { album.ensure_album(pin_id).await });
        wait_for_state(&h.album, pin.id, SyncState::Loading).await;

        task.abort();
        let _ = task.await;

        assert_eq!(
            h.album.state(pin.id),
            SyncState::Failed {
                message: "sync cancelled".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_pin_fails() {
        let h = setup().await;
        let err = h.album.ensure_album(404).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.search.calls(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        let mut sub = h.album.subscribe();
        h.search.push_ok(photo_urls("a", 2), 1);

        h.album.ensure_album(pin.id).await.unwrap();

        assert_eq!(
            sub.events.recv().await.unwrap(),
            SyncEvent {
                pin_id: pin.id,
                state: SyncState::Loading
            }
        );
        assert_eq!(
            sub.events.recv().await.unwrap(),
            SyncEvent {
                pin_id: pin.id,
                state: SyncState::Populated { count: 2 }
            }
        );

        assert!(h.album.unsubscribe(sub.id));
        h.search.push_ok(photo_urls("b", 1), 1);
        h.album.new_collection(pin.id).await.unwrap();
        assert!(sub.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_load_image_downloads_and_caches() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.search.push_ok(vec!["https://farm.example.com/2/abc_m.jpg".to_string()], 1);
        let photo = populated(h.album.ensure_album(pin.id).await.unwrap()).remove(0);
        h.downloader.insert("https://farm.example.com/2/abc_m.jpg", b"jpeg");

        let bytes = h.album.load_image(photo.id).await.unwrap();
        assert_eq!(bytes, b"jpeg");

        let stored = h.store.get_photo(photo.id).await.unwrap().unwrap();
        let expected_name = format!("{}_abc_m.jpg", pin.id);
        assert_eq!(stored.local_file.as_deref(), Some(expected_name.as_str()));
        assert!(h.store.cache().dir().join(&expected_name).exists());

        // Second load is served from the cache
        h.album.load_image(photo.id).await.unwrap();
        assert_eq!(h.downloader.calls(), 1);
    }

    #[tokio::test]
    async fn test_load_image_failure_only_fails_that_photo() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.search.push_ok(photo_urls("a", 2), 1);
        populated(h.album.ensure_album(pin.id).await.unwrap());
        let photos = h.store.list_photos(pin.id).await.unwrap();
        h.downloader.insert(&photos[1].remote_url, b"ok");

        assert!(matches!(
            h.album.load_image(photos[0].id).await,
            Err(SyncError::Download(_))
        ));
        assert_eq!(h.album.load_image(photos[1].id).await.unwrap(), b"ok");
        assert_eq!(h.album.state(pin.id), SyncState::Populated { count: 2 });
        assert_eq!(h.store.list_photos(pin.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_load_image_discarded_after_resync() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.search.push_ok(vec!["https://farm.example.com/1/old.jpg".to_string()], 1);
        let photo = populated(h.album.ensure_album(pin.id).await.unwrap()).remove(0);
        h.downloader.insert(&photo.remote_url, b"old");
        let gate = h.downloader.hold();

        let album = h.album.clone();
        let photo_id = photo.id;
        let download = tokio::spawn(async move { album.load_image(photo_id).await });
        h.downloader.wait_for_calls(1).await;

        h.search.push_ok(photo_urls("new", 2), 1);
        populated(h.album.new_collection(pin.id).await.unwrap());

        gate.add_permits(1);
        let result = download.await.unwrap();
        assert!(matches!(result, Err(SyncError::StalePhoto(id)) if id == photo.id));

        let names: Vec<String> = std::fs::read_dir(h.store.cache().dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.is_empty(), "unexpected cache files {:?}", names);
        assert_eq!(h.store.list_photos(pin.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_load_image_refused_while_loading() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        let photo = h.store.add_photo(pin.id, "https://farm.example.com/1/a.jpg").await.unwrap();
        h.search.push_ok(photo_urls("b", 1), 1);
        let gate = h.search.hold();

        let album = h.album.clone();
        let pin_id = pin.id;
        let sync = tokio::spawn(async move { album.new_collection(pin_id).await });
        wait_for_state(&h.album, pin.id, SyncState::Loading).await;

        assert!(matches!(
            h.album.load_image(photo.id).await,
            Err(SyncError::StalePhoto(_)) | Err(SyncError::Store(StoreError::PhotoNotFound(_)))
        ));
        assert_eq!(h.downloader.calls(), 0);

        gate.add_permits(1);
        sync.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_delete_pin_removes_album() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.search.push_ok(vec!["https://farm.example.com/1/a.jpg".to_string()], 1);
        let photo = populated(h.album.ensure_album(pin.id).await.unwrap()).remove(0);
        h.downloader.insert(&photo.remote_url, b"img");
        h.album.load_image(photo.id).await.unwrap();
        let cached = h.store.cache().dir().join(format!("{}_a.jpg", pin.id));
        assert!(cached.exists());

        h.album.delete_pin(pin.id).await.unwrap();

        assert!(h.album.get_pin(pin.id).await.unwrap_err().is_not_found());
        assert!(h.store.list_photos(pin.id).await.unwrap().is_empty());
        assert!(!cached.exists());
        assert_eq!(h.album.state(pin.id), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_search_result_with_duplicates_still_unique() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        let mut urls = photo_urls("a", 3);
        urls.push(urls[0].clone());
        h.search.push(Ok(SearchResult {
            urls,
            total_pages: 1,
        }));

        let photos = populated(h.album.ensure_album(pin.id).await.unwrap());
        assert_eq!(photos.len(), 3);
    }

    /// Photo store whose first `list_photos` call stalls after reading, until the gate opens.
    struct GatedPhotos {
        inner: Arc<SqliteStore>,
        gate: Mutex<Option<Arc<Semaphore>>>,
        held: AtomicUsize,
    }

    #[async_trait]
    impl PhotoStore for GatedPhotos {
        async fn list_photos(&self, pin_id: i64) -> Result<Vec<Photo>, StoreError> {
            let photos = self.inner.list_photos(pin_id).await?;
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                self.held.fetch_add(1, Ordering::SeqCst);
                let _permit = gate.acquire().await.expect("gate closed");
            }
            Ok(photos)
        }

        async fn get_photo(&self, photo_id: i64) -> Result<Option<Photo>, StoreError> {
            self.inner.get_photo(photo_id).await
        }

        async fn add_photo(&self, pin_id: i64, url: &str) -> Result<Photo, StoreError> {
            self.inner.add_photo(pin_id, url).await
        }

        async fn add_photos(&self, pin_id: i64, urls: &[String]) -> Result<Vec<Photo>, StoreError> {
            self.inner.add_photos(pin_id, urls).await
        }

        async fn set_local_file(&self, photo_id: i64, file_name: &str) -> Result<bool, StoreError> {
            self.inner.set_local_file(photo_id, file_name).await
        }

        async fn delete_photo(&self, photo_id: i64) -> Result<Photo, StoreError> {
            self.inner.delete_photo(photo_id).await
        }

        async fn delete_all_photos(&self, pin_id: i64) -> Result<u64, StoreError> {
            self.inner.delete_all_photos(pin_id).await
        }
    }

    #[tokio::test]
    async fn test_overlapping_first_views_search_once() {
        let (_temp_dir, store) = setup_test_store().await;
        let store = Arc::new(store);
        let gate = Arc::new(Semaphore::new(0));
        let photos = Arc::new(GatedPhotos {
            inner: store.clone(),
            gate: Mutex::new(Some(gate.clone())),
            held: AtomicUsize::new(0),
        });
        let search = Arc::new(FakeSearch::new());
        let album = Arc::new(AlbumSync::new(
            store.clone(),
            photos.clone(),
            search.clone(),
            Arc::new(FakeDownloader::new()),
            store.cache().clone(),
        ));
        let pin = store.add_pin(0.0, 0.0).await.unwrap();
        search.push_ok(photo_urls("a", 21), 4);
        search.push_ok(photo_urls("b", 21), 4);

        // The first trigger sees an empty album, then stalls before taking the slot
        let first = {
            let album = album.clone();
            let pin_id = pin.id;
            tokio::spawn(async move { album.ensure_album(pin_id).await })
        };
        for _ in 0..500 {
            if photos.held.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(photos.held.load(Ordering::SeqCst), 1);

        let second = populated(album.ensure_album(pin.id).await.unwrap());
        assert_eq!(second.len(), 21);

        gate.add_permits(1);
        let first = populated(first.await.unwrap().unwrap());

        assert_eq!(first.len(), 21);
        assert_eq!(search.calls(), 1);
        assert_eq!(store.list_photos(pin.id).await.unwrap().len(), 21);
        assert_eq!(album.state(pin.id), SyncState::Populated { count: 21 });
    }

    #[tokio::test]
    async fn test_delete_photo_updates_count_and_notifies() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.search.push_ok(photo_urls("a", 3), 1);
        let photos = populated(h.album.ensure_album(pin.id).await.unwrap());
        let mut sub = h.album.subscribe();

        h.album.delete_photo(photos[0].id).await.unwrap();

        assert_eq!(h.album.state(pin.id), SyncState::Populated { count: 2 });
        assert_eq!(
            sub.events.try_recv().unwrap(),
            SyncEvent {
                pin_id: pin.id,
                state: SyncState::Populated { count: 2 }
            }
        );
        assert_eq!(h.store.list_photos(pin.id).await.unwrap().len(), 2);
        assert!(h.album.delete_photo(photos[0].id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_pin_notifies_subscribers() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        let mut sub = h.album.subscribe();

        h.album.delete_pin(pin.id).await.unwrap();

        assert_eq!(
            sub.events.try_recv().unwrap(),
            SyncEvent {
                pin_id: pin.id,
                state: SyncState::Deleted
            }
        );
    }

    #[tokio::test]
    async fn test_pin_deleted_mid_sync_leaves_no_state() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.search.push_ok(photo_urls("a", 3), 1);
        let gate = h.search.hold();

        let album = h.album.clone();
        let pin_id = pin.id;
        let sync = tokio::spawn(async move { album.new_collection(pin_id).await });
        wait_for_state(&h.album, pin.id, SyncState::Loading).await;

        h.album.delete_pin(pin.id).await.unwrap();
        assert_eq!(h.album.state(pin.id), SyncState::Loading);

        gate.add_permits(1);
        assert!(sync.await.unwrap().unwrap_err().is_not_found());

        assert!(!h.album.lock_syncs().contains_key(&pin.id));
        assert_eq!(h.album.state(pin.id), SyncState::Idle);
        assert!(h.store.list_photos(pin.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_photo_updates_count_and_respects_limit() {
        let h = setup().await;
        let album = AlbumSync::new(
            h.store.clone(),
            h.store.clone(),
            h.search.clone(),
            h.downloader.clone(),
            h.store.cache().clone(),
        )
        .with_album_limit(3);
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        h.search.push_ok(photo_urls("a", 2), 1);
        populated(album.ensure_album(pin.id).await.unwrap());
        let mut sub = album.subscribe();

        let photo = album
            .add_photo(pin.id, "https://farm.example.com/9/extra_m.jpg")
            .await
            .unwrap();
        assert_eq!(photo.pin_id, pin.id);
        assert_eq!(album.state(pin.id), SyncState::Populated { count: 3 });
        assert_eq!(
            sub.events.try_recv().unwrap(),
            SyncEvent {
                pin_id: pin.id,
                state: SyncState::Populated { count: 3 }
            }
        );

        let full = album
            .add_photo(pin.id, "https://farm.example.com/9/more_m.jpg")
            .await;
        assert!(matches!(full, Err(SyncError::AlbumFull { limit: 3, .. })));
    }

    #[tokio::test]
    async fn test_add_photo_rejected_cases() {
        let h = setup().await;
        let pin = h.store.add_pin(0.0, 0.0).await.unwrap();
        let url = "https://farm.example.com/1/a.jpg";
        h.album.add_photo(pin.id, url).await.unwrap();

        assert!(matches!(
            h.album.add_photo(pin.id, url).await,
            Err(SyncError::Store(StoreError::DuplicatePhoto { .. }))
        ));
        assert!(matches!(
            h.album.add_photo(pin.id, "not a url").await,
            Err(SyncError::Cache(CacheError::InvalidName(_)))
        ));
        assert!(h.album.add_photo(999, url).await.unwrap_err().is_not_found());

        h.search.push_ok(photo_urls("b", 1), 1);
        let gate = h.search.hold();
        let album = h.album.clone();
        let pin_id = pin.id;
        let sync = tokio::spawn(async move { album.new_collection(pin_id).await });
        wait_for_state(&h.album, pin.id, SyncState::Loading).await;

        assert!(matches!(
            h.album.add_photo(pin.id, "https://farm.example.com/1/c.jpg").await,
            Err(SyncError::SyncInProgress(id)) if id == pin.id
        ));

        gate.add_permits(1);
        sync.await.unwrap().unwrap();
    }
}
