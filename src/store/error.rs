// SPDX-License-Identifier: GPL-3.0-only
use thiserror::Error;

/// Errors raised by the local pin/photo store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Read or write against SQLite failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Pin {0} not found")]
    PinNotFound(i64),

    #[error("Photo {0} not found")]
    PhotoNotFound(i64),

    #[error("Photo {url} is already in the album of pin {pin_id}")]
    DuplicatePhoto { pin_id: i64, url: String },

    /// Coordinates outside [-90, 90] x [-180, 180].
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// A stored column held a value the model can't represent.
    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}
