// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const LAT_MIN: f64 = -90.0;
pub const LAT_MAX: f64 = 90.0;
pub const LON_MIN: f64 = -180.0;
pub const LON_MAX: f64 = 180.0;

/// A user-placed point of interest on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub id: i64,

    pub latitude: f64,

    pub longitude: f64,

    /// Total page count reported by the last successful search, used to
    /// bound the next random page pick
    pub pagination_cursor: Option<u32>,

    pub created_at: DateTime<Utc>,
}

impl Pin {
    pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
        (LAT_MIN..=LAT_MAX).contains(&latitude) && (LON_MIN..=LON_MAX).contains(&longitude)
    }
}

/// An image belonging to a pin's album.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,

    pub pin_id: i64,

    /// Remote image URL returned by the photo search
    pub remote_url: String,

    /// File name inside the image cache directory, once downloaded
    pub local_file: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Last-viewed map region. Only one is ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapViewState {
    pub center_lat: f64,
    pub center_lon: f64,
    pub lat_span: f64,
    pub lon_span: f64,
}
