// SPDX-License-Identifier: GPL-3.0-only
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::album::{AlbumSync, SyncError, SyncOutcome, SyncState};
use crate::cache::CacheError;
use crate::search::SearchError;
use crate::store::{MapStateStore, MapViewState, Photo, Pin, StoreError};

#[derive(Debug, Serialize, Deserialize)]
pub struct AddPinRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddPhotoRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Error response carrying a user-presentable message in the envelope.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        let status = match &e {
            _ if e.is_not_found() => StatusCode::NOT_FOUND,
            SyncError::Store(StoreError::InvalidCoordinate { .. })
            | SyncError::Cache(CacheError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            SyncError::Search(SearchError::Transport(_)) => StatusCode::GATEWAY_TIMEOUT,
            SyncError::Search(_) | SyncError::Download(_) => StatusCode::BAD_GATEWAY,
            SyncError::StalePhoto(_)
            | SyncError::SyncInProgress(_)
            | SyncError::AlbumFull { .. }
            | SyncError::Store(StoreError::DuplicatePhoto { .. }) => StatusCode::CONFLICT,
            SyncError::Store(_) | SyncError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %e, "Request failed");
        } else {
            warn!(error = %e, "Request rejected");
        }

        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        SyncError::from(e).into()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub struct ApiHandlers {
    album: Arc<AlbumSync>,
    map_state: Arc<dyn MapStateStore>,
}

impl ApiHandlers {
    pub fn new(album: Arc<AlbumSync>, map_state: Arc<dyn MapStateStore>) -> Self {
        Self { album, map_state }
    }

    pub fn album(&self) -> &Arc<AlbumSync> {
        &self.album
    }
}

impl ApiHandlers {
    pub async fn health() -> Json<ApiResponse<&'static str>> {
        Json(ApiResponse::success("ok"))
    }

    pub async fn list_pins(&self) -> ApiResult<Vec<Pin>> {
        Ok(Json(ApiResponse::success(self.album.list_pins().await?)))
    }

    pub async fn add_pin(&self, request: AddPinRequest) -> ApiResult<Pin> {
        let pin = self.album.add_pin(request.latitude, request.longitude).await?;
        Ok(Json(ApiResponse::success(pin)))
    }

    pub async fn get_pin(&self, id: i64) -> ApiResult<Pin> {
        Ok(Json(ApiResponse::success(self.album.get_pin(id).await?)))
    }

    pub async fn delete_pin(&self, id: i64) -> ApiResult<()> {
        self.album.delete_pin(id).await?;
        info!(pin_id = id, "Pin deleted");
        Ok(Json(ApiResponse::success(())))
    }

    pub async fn album_photos(&self, pin_id: i64) -> ApiResult<SyncOutcome> {
        Ok(Json(ApiResponse::success(self.album.ensure_album(pin_id).await?)))
    }

    pub async fn add_photo(&self, pin_id: i64, request: AddPhotoRequest) -> ApiResult<Photo> {
        let photo = self.album.add_photo(pin_id, &request.url).await?;
        Ok(Json(ApiResponse::success(photo)))
    }

    pub async fn new_collection(&self, pin_id: i64) -> ApiResult<SyncOutcome> {
        info!(pin_id, "New collection requested");
        Ok(Json(ApiResponse::success(self.album.new_collection(pin_id).await?)))
    }

    pub async fn sync_state(&self, pin_id: i64) -> ApiResult<SyncState> {
        Ok(Json(ApiResponse::success(self.album.state(pin_id))))
    }

    pub async fn delete_photo(&self, photo_id: i64) -> ApiResult<()> {
        self.album.delete_photo(photo_id).await?;
        Ok(Json(ApiResponse::success(())))
    }

    pub async fn photo_image(&self, photo_id: i64) -> Result<Response, ApiError> {
        let photo = self.album.load_image(photo_id).await?;
        Ok(([(header::CONTENT_TYPE, content_type_for(&photo))], photo).into_response())
    }

    pub async fn get_map_state(&self) -> ApiResult<Option<MapViewState>> {
        Ok(Json(ApiResponse::success(self.map_state.get_map_state().await?)))
    }

    pub async fn save_map_state(&self, state: MapViewState) -> ApiResult<()> {
        self.map_state.save_map_state(state).await?;
        Ok(Json(ApiResponse::success(())))
    }
}

/// Sniff common image signatures.
fn content_type_for(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        _ => "application/octet-stream",
    }
}
