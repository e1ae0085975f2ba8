// SPDX-License-Identifier: GPL-3.0-only
pub mod error;
pub mod image_cache;

pub use error::CacheError;
pub use image_cache::ImageCache;
