// SPDX-License-Identifier: GPL-3.0-only
pub mod error;
pub mod models;
pub mod traits;
pub mod sqlite;

pub use error::StoreError;
pub use models::{MapViewState, Photo, Pin};
pub use traits::{MapStateStore, PhotoStore, PinStore};
pub use sqlite::SqliteStore;
