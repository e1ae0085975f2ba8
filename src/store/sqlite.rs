// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, error, info};

use crate::cache::ImageCache;
use crate::store::error::StoreError;
use crate::store::models::{MapViewState, Photo, Pin};
use crate::store::traits::{MapStateStore, PhotoStore, PinStore};

/// SQLite-backed pin, photo and map state store.
///
/// The pool holds a single connection, so every read and write is serialized.
/// Photo deletions also remove cached image files; filesystem failures there are
/// logged and never roll back the row deletion.
pub struct SqliteStore {
    pool: SqlitePool,
    cache: ImageCache,
}

impl SqliteStore {
    pub async fn new(db_path: &Path, cache: ImageCache) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool, cache };
        store.init_schema().await?;

        Ok(store)
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                pagination_cursor INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS photos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pin_id INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
                remote_url TEXT NOT NULL,
                local_file TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (pin_id, remote_url)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_photos_pin_id ON photos (pin_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS map_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                center_lat REAL NOT NULL,
                center_lon REAL NOT NULL,
                lat_span REAL NOT NULL,
                lon_span REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Initialized SQLite store schema");
        Ok(())
    }

    fn pin_from_row(row: &SqliteRow) -> Result<Pin, StoreError> {
        let pagination_cursor = row
            .get::<Option<i64>, _>("pagination_cursor")
            .map(|v| {
                u32::try_from(v).map_err(|_| StoreError::CorruptRow {
                    table: "pins",
                    reason: format!("pagination_cursor out of range: {}", v),
                })
            })
            .transpose()?;

        Ok(Pin {
            id: row.get::<i64, _>("id"),
            latitude: row.get::<f64, _>("latitude"),
            longitude: row.get::<f64, _>("longitude"),
            pagination_cursor,
            created_at: parse_timestamp("pins", &row.get::<String, _>("created_at"))?,
        })
    }

    fn photo_from_row(row: &SqliteRow) -> Result<Photo, StoreError> {
        Ok(Photo {
            id: row.get::<i64, _>("id"),
            pin_id: row.get::<i64, _>("pin_id"),
            remote_url: row.get::<String, _>("remote_url"),
            local_file: row.get::<Option<String>, _>("local_file"),
            created_at: parse_timestamp("photos", &row.get::<String, _>("created_at"))?,
        })
    }

    async fn remove_cached_files(&self, files: Vec<String>) {
        for file in files {
            self.cache.remove_best_effort(&file).await;
        }
    }
}

fn parse_timestamp(table: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            reason: format!("bad created_at {:?}: {}", value, e),
        })
}

#[async_trait]
impl PinStore for SqliteStore {
    async fn add_pin(&self, latitude: f64, longitude: f64) -> Result<Pin, StoreError> {
        if !Pin::is_valid_coordinate(latitude, longitude) {
            return Err(StoreError::InvalidCoordinate { latitude, longitude });
        }

        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO pins (latitude, longitude, pagination_cursor, created_at) VALUES (?1, ?2, NULL, ?3)",
        )
        .bind(latitude)
        .bind(longitude)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let pin = Pin {
            id: result.last_insert_rowid(),
            latitude,
            longitude,
            pagination_cursor: None,
            created_at,
        };

        info!(pin_id = pin.id, latitude, longitude, "Added pin");
        Ok(pin)
    }

    async fn get_pin(&self, id: i64) -> Result<Option<Pin>, StoreError> {
        let row = sqlx::query("SELECT * FROM pins WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::pin_from_row).transpose()
    }

    async fn list_pins(&self) -> Result<Vec<Pin>, StoreError> {
        let rows = sqlx::query("SELECT * FROM pins ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut pins = Vec::with_capacity(rows.len());
        for row in rows {
            match Self::pin_from_row(&row) {
                Ok(pin) => pins.push(pin),
                Err(e) => error!(error = %e, "Failed to parse pin from database"),
            }
        }

        Ok(pins)
    }

    async fn set_pagination_cursor(&self, id: i64, total_pages: u32) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE pins SET pagination_cursor = ?2 WHERE id = ?1")
            .bind(id)
            .bind(i64::from(total_pages))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PinNotFound(id));
        }

        debug!(pin_id = id, total_pages, "Updated pagination cursor");
        Ok(())
    }

    async fn delete_pin(&self, id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT id FROM pins WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::PinNotFound(id));
        }

        // Dependents first, so the cascade doesn't rely on the foreign key pragma
        let files: Vec<String> = sqlx::query_scalar(
            "SELECT local_file FROM photos WHERE pin_id = ?1 AND local_file IS NOT NULL",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let photos = sqlx::query("DELETE FROM photos WHERE pin_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM pins WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(pin_id = id, photos = photos.rows_affected(), "Deleted pin");
        self.remove_cached_files(files).await;
        Ok(())
    }
}

#[async_trait]
impl PhotoStore for SqliteStore {
    async fn list_photos(&self, pin_id: i64) -> Result<Vec<Photo>, StoreError> {
        let rows = sqlx::query("SELECT * FROM photos WHERE pin_id = ?1 ORDER BY id")
            .bind(pin_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::photo_from_row).collect()
    }

    async fn get_photo(&self, photo_id: i64) -> Result<Option<Photo>, StoreError> {
        let row = sqlx::query("SELECT * FROM photos WHERE id = ?1")
            .bind(photo_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::photo_from_row).transpose()
    }

    async fn add_photo(&self, pin_id: i64, url: &str) -> Result<Photo, StoreError> {
        if self.get_pin(pin_id).await?.is_none() {
            return Err(StoreError::PinNotFound(pin_id));
        }

        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO photos (pin_id, remote_url, local_file, created_at) VALUES (?1, ?2, NULL, ?3)",
        )
        .bind(pin_id)
        .bind(url)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicatePhoto {
                pin_id,
                url: url.to_string(),
            },
            other => StoreError::Persistence(other),
        })?;

        info!(pin_id, photo_id = result.last_insert_rowid(), "Added photo");
        Ok(Photo {
            id: result.last_insert_rowid(),
            pin_id,
            remote_url: url.to_string(),
            local_file: None,
            created_at,
        })
    }

    async fn add_photos(&self, pin_id: i64, urls: &[String]) -> Result<Vec<Photo>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT id FROM pins WHERE id = ?1")
            .bind(pin_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::PinNotFound(pin_id));
        }

        let created_at = Utc::now();
        let mut photos = Vec::with_capacity(urls.len());
        for url in urls {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO photos (pin_id, remote_url, local_file, created_at) VALUES (?1, ?2, NULL, ?3)",
            )
            .bind(pin_id)
            .bind(url)
            .bind(created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 1 {
                photos.push(Photo {
                    id: result.last_insert_rowid(),
                    pin_id,
                    remote_url: url.clone(),
                    local_file: None,
                    created_at,
                });
            }
        }

        tx.commit().await?;

        info!(pin_id, count = photos.len(), "Added photos");
        Ok(photos)
    }

    async fn set_local_file(&self, photo_id: i64, file_name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE photos SET local_file = ?2 WHERE id = ?1")
            .bind(photo_id)
            .bind(file_name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_photo(&self, photo_id: i64) -> Result<Photo, StoreError> {
        let photo = self
            .get_photo(photo_id)
            .await?
            .ok_or(StoreError::PhotoNotFound(photo_id))?;

        sqlx::query("DELETE FROM photos WHERE id = ?1")
            .bind(photo_id)
            .execute(&self.pool)
            .await?;

        info!(photo_id, pin_id = photo.pin_id, "Deleted photo");
        if let Some(file) = &photo.local_file {
            self.cache.remove_best_effort(file).await;
        }
        Ok(photo)
    }

    async fn delete_all_photos(&self, pin_id: i64) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let files: Vec<String> = sqlx::query_scalar(
            "SELECT local_file FROM photos WHERE pin_id = ?1 AND local_file IS NOT NULL",
        )
        .bind(pin_id)
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM photos WHERE pin_id = ?1")
            .bind(pin_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(pin_id, count = result.rows_affected(), "Deleted all photos of pin");
        self.remove_cached_files(files).await;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MapStateStore for SqliteStore {
    async fn get_map_state(&self) -> Result<Option<MapViewState>, StoreError> {
        let row = sqlx::query("SELECT * FROM map_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| MapViewState {
            center_lat: row.get::<f64, _>("center_lat"),
            center_lon: row.get::<f64, _>("center_lon"),
            lat_span: row.get::<f64, _>("lat_span"),
            lon_span: row.get::<f64, _>("lon_span"),
        }))
    }

    async fn save_map_state(&self, state: MapViewState) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO map_state (id, center_lat, center_lon, lat_span, lon_span)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                center_lat = excluded.center_lat,
                center_lon = excluded.center_lon,
                lat_span = excluded.lat_span,
                lon_span = excluded.lon_span
            "#,
        )
        .bind(state.center_lat)
        .bind(state.center_lon)
        .bind(state.lat_span)
        .bind(state.lon_span)
        .execute(&self.pool)
        .await?;

        debug!("Saved map view state");
        Ok(())
    }
}
