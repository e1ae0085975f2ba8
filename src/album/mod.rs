// SPDX-License-Identifier: GPL-3.0-only
pub mod error;
pub mod state;
pub mod sync;

pub use error::SyncError;
pub use state::SyncState;
pub use sync::{AlbumSync, SyncOutcome};
