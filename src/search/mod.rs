// SPDX-License-Identifier: GPL-3.0-only
pub mod bbox;
pub mod error;
pub mod flickr;
pub mod traits;

pub use error::SearchError;
pub use flickr::{FlickrClient, SearchSettings};
pub use traits::{PhotoSearch, SearchResult};
