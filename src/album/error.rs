// SPDX-License-Identifier: GPL-3.0-only
use thiserror::Error;

use crate::cache::CacheError;
use crate::downloader::DownloadError;
use crate::search::SearchError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Album of pin {0} is syncing")]
    SyncInProgress(i64),

    #[error("Album of pin {pin_id} already holds {limit} photos")]
    AlbumFull { pin_id: i64, limit: usize },

    /// The photo was deleted or its album re-synced while the image was in flight.
    #[error("Photo {0} is no longer part of its album")]
    StalePhoto(i64),
}

impl SyncError {
    /// Whether the failure came from a missing pin or photo record.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SyncError::Store(StoreError::PinNotFound(_) | StoreError::PhotoNotFound(_))
        )
    }
}
