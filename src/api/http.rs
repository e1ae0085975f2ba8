// SPDX-License-Identifier: GPL-3.0-only
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::album::{SyncOutcome, SyncState};
use crate::api::handlers::{
    AddPhotoRequest, AddPinRequest, ApiError, ApiHandlers, ApiResponse, ApiResult,
};
use crate::api::websocket::WebSocketServer;
use crate::store::{MapViewState, Photo, Pin};

pub struct HttpServer {
    handlers: Arc<ApiHandlers>,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn new(handlers: ApiHandlers, addr: SocketAddr) -> Self {
        Self {
            handlers: Arc::new(handlers),
            addr,
        }
    }

    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/api/health", get(health_handler))
            .route("/api/pins", get(list_pins_handler).post(add_pin_handler))
            .route("/api/pins/:id", get(get_pin_handler).delete(delete_pin_handler))
            .route("/api/pins/:id/photos", get(album_handler).post(add_photo_handler))
            .route("/api/pins/:id/new-collection", post(new_collection_handler))
            .route("/api/pins/:id/state", get(sync_state_handler))
            .route("/api/photos/:id", delete(delete_photo_handler))
            .route("/api/photos/:id/image", get(photo_image_handler))
            .route("/api/map-state", get(get_map_state_handler).put(save_map_state_handler))
            .with_state(self.handlers.clone());

        api.merge(WebSocketServer::new(self.handlers.clone()).router())
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let app = self.router();

        info!(addr = %self.addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn health_handler() -> Json<ApiResponse<&'static str>> {
    ApiHandlers::health().await
}

async fn list_pins_handler(State(handlers): State<Arc<ApiHandlers>>) -> ApiResult<Vec<Pin>> {
    handlers.list_pins().await
}

async fn add_pin_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Json(request): Json<AddPinRequest>,
) -> ApiResult<Pin> {
    handlers.add_pin(request).await
}

async fn get_pin_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Path(id): Path<i64>,
) -> ApiResult<Pin> {
    handlers.get_pin(id).await
}

async fn delete_pin_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    handlers.delete_pin(id).await
}

async fn album_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Path(id): Path<i64>,
) -> ApiResult<SyncOutcome> {
    handlers.album_photos(id).await
}

async fn add_photo_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Path(id): Path<i64>,
    Json(request): Json<AddPhotoRequest>,
) -> ApiResult<Photo> {
    handlers.add_photo(id, request).await
}

async fn new_collection_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Path(id): Path<i64>,
) -> ApiResult<SyncOutcome> {
    handlers.new_collection(id).await
}

async fn sync_state_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Path(id): Path<i64>,
) -> ApiResult<SyncState> {
    handlers.sync_state(id).await
}

async fn delete_photo_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    handlers.delete_photo(id).await
}

async fn photo_image_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    handlers.photo_image(id).await
}

async fn get_map_state_handler(
    State(handlers): State<Arc<ApiHandlers>>,
) -> ApiResult<Option<MapViewState>> {
    handlers.get_map_state().await
}

async fn save_map_state_handler(
    State(handlers): State<Arc<ApiHandlers>>,
    Json(state): Json<MapViewState>,
) -> ApiResult<()> {
    handlers.save_map_state(state).await
}
