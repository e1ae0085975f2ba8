// SPDX-License-Identifier: GPL-3.0-only
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::cache::error::CacheError;

/// Maximum length of a cache file name
const MAX_FILE_NAME_LENGTH: usize = 255;

/// On-disk store of downloaded images, addressed by file name.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub async fn new(dir: PathBuf) -> Result<Self, CacheError> {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::fs(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Derive a cache file name from the last path segment of a remote URL.
    ///
    /// `https://farm1.staticflickr.com/2/1418878_1e92283336_m.jpg` maps to
    /// `1418878_1e92283336_m.jpg`. Returns `None` when the URL has no usable segment.
    pub fn file_name_for(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
        let name = sanitize_file_name(segment);
        is_usable_name(&name).then_some(name)
    }

    /// Absolute path of a cache entry. The name is reduced to a single safe component.
    pub fn path_for(&self, file_name: &str) -> Result<PathBuf, CacheError> {
        let name = sanitize_file_name(file_name);
        if !is_usable_name(&name) {
            return Err(CacheError::InvalidName(file_name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// Write an image atomically: bytes land in a `.part` file that is renamed into place.
    pub async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let path = self.path_for(file_name)?;
        let part_path = self.dir.join(format!("{}.part", Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&part_path, bytes).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(CacheError::fs(&part_path, e));
        }
        if let Err(e) = tokio::fs::rename(&part_path, &path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(CacheError::fs(&path, e));
        }

        debug!(path = %path.display(), bytes = bytes.len(), "Cached image");
        Ok(path)
    }

    /// Read a cached image. A missing file is `Ok(None)`.
    pub async fn read(&self, file_name: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(file_name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::fs(&path, e)),
        }
    }

    /// Delete a cached image. Returns whether a file was actually removed.
    pub async fn remove(&self, file_name: &str) -> Result<bool, CacheError> {
        let path = self.path_for(file_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::fs(&path, e)),
        }
    }

    /// Delete a cached image, logging instead of failing.
    pub async fn remove_best_effort(&self, file_name: &str) {
        if let Err(e) = self.remove(file_name).await {
            warn!(file = %file_name, error = %e, "Failed to delete cached image");
        }
    }
}

/// Keep only the final path component and drop characters unsafe in file names.
fn sanitize_file_name(name: &str) -> String {
    let name_only = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name);

    name_only
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_usable_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_FILE_NAME_LENGTH && !name.chars().all(|c| c == '.')
}
