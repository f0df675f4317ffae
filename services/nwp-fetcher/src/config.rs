//! Fetch configuration loaded from YAML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. CLI flags override individual fields afterwards.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use forecast_stack::{
    BoundingBoxClipper, ConfigError, ForecastRequest, HttpArchiveConfig, Precision, RetryPolicy,
};
use nwp_common::BoundingBox;
use serde::Deserialize;
use tracing::debug;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_feature")]
    pub feature: String,
    #[serde(default = "default_grid_marker")]
    pub grid_marker: String,
    #[serde(default = "default_buffer_hours")]
    pub buffer_hours: u32,
    #[serde(default = "default_precision")]
    pub precision: String,
    /// Crop region; the full grid when absent
    #[serde(default)]
    pub region: Option<RegionConfig>,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

fn default_model() -> String {
    "icon-eu".to_string()
}

fn default_feature() -> String {
    "tot_prec".to_string()
}

fn default_grid_marker() -> String {
    "regular".to_string()
}

fn default_buffer_hours() -> u32 {
    4
}

fn default_precision() -> String {
    "float16".to_string()
}

/// Lon/lat box to crop every frame to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegionConfig {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
    /// Extra cells kept around the box
    #[serde(default = "default_buffer_cells")]
    pub buffer_cells: usize,
}

fn default_buffer_cells() -> usize {
    1
}

/// Archive endpoint and retry behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// Attempts per operation; unbounded when absent
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Exponential backoff multiplier; fixed delay when absent
    #[serde(default)]
    pub backoff_factor: Option<f64>,
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://opendata.dwd.de/".to_string()
}

fn default_retry_delay() -> u64 {
    5
}

fn default_max_retry_delay() -> u64 {
    120
}

fn default_request_timeout() -> u64 {
    600 // 10 minutes
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            retry_delay_secs: default_retry_delay(),
            max_attempts: None,
            backoff_factor: None,
            max_retry_delay_secs: default_max_retry_delay(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            feature: default_feature(),
            grid_marker: default_grid_marker(),
            buffer_hours: default_buffer_hours(),
            precision: default_precision(),
            region: None,
            archive: ArchiveConfig::default(),
        }
    }
}

impl FetchConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(model = %config.model, path = %path.display(), "Loaded fetch config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to null; treat it as all defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Validated request; fails on unknown models before anything touches the network.
    pub fn request(&self) -> Result<ForecastRequest, ConfigError> {
        Ok(
            ForecastRequest::new(&self.model, self.feature.clone(), self.buffer_hours)?
                .with_grid_marker(self.grid_marker.clone()),
        )
    }

    pub fn precision(&self) -> Result<Precision, ConfigError> {
        self.precision.parse()
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let archive = &self.archive;
        let mut policy = RetryPolicy::fixed(Duration::from_secs(archive.retry_delay_secs));

        if let Some(max_attempts) = archive.max_attempts {
            if max_attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "archive.max_attempts",
                    reason: "must be at least 1".to_string(),
                });
            }
            policy = policy.with_max_attempts(max_attempts);
        }

        if let Some(factor) = archive.backoff_factor {
            if !(factor >= 1.0) {
                return Err(ConfigError::InvalidValue {
                    field: "archive.backoff_factor",
                    reason: format!("{} is below 1.0", factor),
                });
            }
            policy = policy.with_backoff(factor, Duration::from_secs(archive.max_retry_delay_secs));
        }

        Ok(policy)
    }

    pub fn http_config(&self) -> HttpArchiveConfig {
        HttpArchiveConfig {
            base_url: self.archive.base_url.clone(),
            request_timeout: Duration::from_secs(self.archive.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.archive.connect_timeout_secs),
        }
    }

    /// Clipper for the configured region, if any.
    pub fn clipper(&self) -> Result<Option<BoundingBoxClipper>, ConfigError> {
        let Some(region) = &self.region else {
            return Ok(None);
        };

        if region.min_lon >= region.max_lon || region.min_lat >= region.max_lat {
            return Err(ConfigError::InvalidValue {
                field: "region",
                reason: "min must be below max".to_string(),
            });
        }

        let bbox = BoundingBox::new(
            region.min_lon,
            region.min_lat,
            region.max_lon,
            region.max_lat,
        );
        Ok(Some(BoundingBoxClipper::new(bbox, region.buffer_cells)))
    }
}
