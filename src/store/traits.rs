// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use crate::store::error::StoreError;
use crate::store::models::{MapViewState, Photo, Pin};

#[async_trait]
pub trait PinStore: Send + Sync {
    /// Create a pin at the given coordinate
    async fn add_pin(&self, latitude: f64, longitude: f64) -> Result<Pin, StoreError>;

    async fn get_pin(&self, id: i64) -> Result<Option<Pin>, StoreError>;

    async fn list_pins(&self) -> Result<Vec<Pin>, StoreError>;

    /// Remember the total page count from the last search
    async fn set_pagination_cursor(&self, id: i64, total_pages: u32) -> Result<(), StoreError>;

    /// Delete a pin together with its photos and their cached files
    async fn delete_pin(&self, id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn list_photos(&self, pin_id: i64) -> Result<Vec<Photo>, StoreError>;

    async fn get_photo(&self, photo_id: i64) -> Result<Option<Photo>, StoreError>;

    /// Insert one photo. A URL already in the pin's album is `DuplicatePhoto`.
    async fn add_photo(&self, pin_id: i64, url: &str) -> Result<Photo, StoreError>;

    /// Insert a batch of photos in one transaction. Duplicate URLs are skipped.
    async fn add_photos(&self, pin_id: i64, urls: &[String]) -> Result<Vec<Photo>, StoreError>;

    /// Attach a cached file to a photo. Returns false when the photo no longer exists.
    async fn set_local_file(&self, photo_id: i64, file_name: &str) -> Result<bool, StoreError>;

    /// Delete one photo and, best-effort, its cached file. Returns the deleted row.
    async fn delete_photo(&self, photo_id: i64) -> Result<Photo, StoreError>;

    /// Delete every photo of a pin and, best-effort, their cached files.
    /// Returns the number of rows removed.
    async fn delete_all_photos(&self, pin_id: i64) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait MapStateStore: Send + Sync {
    async fn get_map_state(&self) -> Result<Option<MapViewState>, StoreError>;

    async fn save_map_state(&self, state: MapViewState) -> Result<(), StoreError>;
}
