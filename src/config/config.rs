// SPDX-License-Identifier: GPL-3.0-only
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database path for pins, photos and map state
    pub database_path: PathBuf,

    /// Application-private directory holding downloaded images
    pub image_cache_dir: PathBuf,

    /// Flickr REST endpoint
    pub search_api_url: String,

    /// Flickr API key
    pub search_api_key: String,

    /// Number of photos requested per search page (also the album size cap)
    pub photos_per_page: u32,

    /// Highest page number a random page pick may land on
    pub page_limit: u32,

    /// Bounding box half-width in degrees of longitude
    pub bbox_half_width: f64,

    /// Bounding box half-height in degrees of latitude
    pub bbox_half_height: f64,

    /// Timeout for outgoing HTTP requests in seconds
    pub request_timeout_secs: u64,

    /// Attempts per image download, including the first
    pub download_max_retries: u32,

    /// Local API bind address (e.g., "127.0.0.1:8080")
    pub local_api_bind: SocketAddr,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log line format
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow::anyhow!("Unknown log format: {}", other)),
        }
    }
}

impl Config {
    /// Load configuration from TOML file with environment variable overrides
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("VT_CONFIG")
            .unwrap_or_else(|_| "config.toml".to_string());

        let mut config: Config = if std::path::Path::new(&config_path).exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str(&contents)?
        } else {
            Config::default()
        };

        if let Ok(val) = std::env::var("VT_DATABASE_PATH") {
            config.database_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("VT_IMAGE_CACHE_DIR") {
            config.image_cache_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("VT_SEARCH_API_URL") {
            config.search_api_url = val;
        }
        if let Ok(val) = std::env::var("VT_SEARCH_API_KEY") {
            config.search_api_key = val;
        }
        if let Ok(val) = std::env::var("VT_PHOTOS_PER_PAGE") {
            config.photos_per_page = val.parse()?;
        }
        if let Ok(val) = std::env::var("VT_PAGE_LIMIT") {
            config.page_limit = val.parse()?;
        }
        if let Ok(val) = std::env::var("VT_BBOX_HALF_WIDTH") {
            config.bbox_half_width = val.parse()?;
        }
        if let Ok(val) = std::env::var("VT_BBOX_HALF_HEIGHT") {
            config.bbox_half_height = val.parse()?;
        }
        if let Ok(val) = std::env::var("VT_DOWNLOAD_MAX_RETRIES") {
            config.download_max_retries = val.parse()?;
        }
        if let Ok(val) = std::env::var("VT_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = val.parse()?;
        }
        if let Ok(val) = std::env::var("VT_LOCAL_API_BIND") {
            config.local_api_bind = SocketAddr::from_str(&val)?;
        }
        if let Ok(val) = std::env::var("VT_LOG_LEVEL") {
            config.log_level = val;
        }
        if let Ok(val) = std::env::var("VT_LOG_FORMAT") {
            config.log_format = val.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.photos_per_page == 0 {
            return Err(anyhow::anyhow!("photos_per_page must be at least 1"));
        }
        if self.page_limit == 0 {
            return Err(anyhow::anyhow!("page_limit must be at least 1"));
        }
        if !(self.bbox_half_width > 0.0 && self.bbox_half_height > 0.0) {
            return Err(anyhow::anyhow!("bounding box half sizes must be positive"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("virtual_tourist.db"),
            image_cache_dir: PathBuf::from("images"),
            search_api_url: String::from("https://api.flickr.com/services/rest/"),
            search_api_key: String::new(),
            photos_per_page: 21,
            page_limit: 40,
            bbox_half_width: 1.0,
            bbox_half_height: 1.0,
            request_timeout_secs: 30,
            download_max_retries: 3,
            local_api_bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: String::from("info"),
            log_format: LogFormat::Pretty,
        }
    }
}
