// SPDX-License-Identifier: GPL-3.0-only
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Creating, writing, reading or deleting a cache file failed.
    #[error("Filesystem error at {path}: {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The name can't be used as a file inside the cache directory.
    #[error("Invalid cache file name: {0:?}")]
    InvalidName(String),
}

impl CacheError {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }
}
