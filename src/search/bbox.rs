// SPDX-License-Identifier: GPL-3.0-only
use std::fmt;

use crate::store::models::{LAT_MAX, LAT_MIN, LON_MAX, LON_MIN};

/// Rectangular lat/lon region scoping a photo search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Box centred on a coordinate, each edge clamped to the valid lat/lon range.
    pub fn around(latitude: f64, longitude: f64, half_width: f64, half_height: f64) -> Self {
        Self {
            min_lon: (longitude - half_width).max(LON_MIN),
            min_lat: (latitude - half_height).max(LAT_MIN),
            max_lon: (longitude + half_width).min(LON_MAX),
            max_lat: (latitude + half_height).min(LAT_MAX),
        }
    }
}

/// Flickr's `bbox` parameter order: min_lon,min_lat,max_lon,max_lat
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }
}
