//! Index configuration
//!
//! `Config` is serializable so a deployment can keep the area of interest,
//! tree shape and distance horizon in a JSON or TOML file next to its data.

use crate::spatial::DistanceMetric;
use driftmap_types::quadcode::Quadcode;
use driftmap_types::region::{Frame, Region};
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Index and query configuration
///
/// # Example
///
/// ```rust
/// use driftmap::Config;
///
/// let config = Config::default();
/// assert_eq!(config.max_points, 20);
///
/// let json = r#"{
///     "max_points": 32,
///     "max_distance_km": 2.5,
///     "cache_capacity": null
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.max_points, 32);
/// assert!(config.cache_capacity().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Area of interest; every indexed reading must lie inside it.
    #[serde(default = "Config::default_area")]
    pub area: Region,

    /// Readings a node holds before it divides.
    ///
    /// Small values make the tree halve narrow latitude bands many times,
    /// which loses boundary precision; 10 or more is safe for regional data.
    #[serde(default = "Config::default_max_points")]
    pub max_points: usize,

    /// Depth at which nodes stop dividing and absorb extra readings.
    #[serde(default = "Config::default_max_depth")]
    pub max_depth: u8,

    /// Largest neighbor distance of interest (km).
    #[serde(default = "Config::default_max_distance_km")]
    pub max_distance_km: f32,

    /// Metric used when measuring neighbor distances.
    #[serde(default)]
    pub distance_metric: DistanceMetric,

    /// Maximum number of memoized aggregation results (None = unbounded).
    #[serde(default = "Config::default_cache_capacity")]
    pub cache_capacity: Option<usize>,
}

impl Config {
    /// The German Bight, where the drifter fleet operates.
    fn default_area() -> Region {
        Region::geographic(7.2, 9.5, 53.5, 54.6)
    }

    const fn default_max_points() -> usize {
        20
    }

    const fn default_max_depth() -> u8 {
        20
    }

    const fn default_max_distance_km() -> f32 {
        1.0
    }

    const fn default_cache_capacity() -> Option<usize> {
        Some(256)
    }

    pub fn with_area(mut self, area: Region) -> Self {
        self.area = area;
        self
    }

    pub fn with_max_points(mut self, max_points: usize) -> Self {
        assert!(max_points > 0, "max_points must be greater than zero");
        self.max_points = max_points;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        assert!(
            max_depth <= Quadcode::MAX_DEPTH,
            "max_depth must not exceed {}",
            Quadcode::MAX_DEPTH
        );
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_distance_km(mut self, km: f32) -> Self {
        self.max_distance_km = km;
        self
    }

    pub fn with_distance_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = metric;
        self
    }

    /// Bound the aggregation cache; `None` keeps every result for the process lifetime.
    pub fn with_cache_capacity(mut self, capacity: Option<usize>) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Cache capacity as a `NonZeroUsize`, if bounded.
    pub fn cache_capacity(&self) -> Option<NonZeroUsize> {
        self.cache_capacity.and_then(NonZeroUsize::new)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if !self.area.is_valid() || self.area.width() <= 0.0 || self.area.height() <= 0.0 {
            return Err("Area must have finite, non-empty bounds".to_string());
        }
        if self.area.frame != Frame::Geographic {
            return Err("Area must be given in the geographic frame".to_string());
        }
        if self.max_points == 0 {
            return Err("max_points must be greater than zero".to_string());
        }
        if self.max_depth > Quadcode::MAX_DEPTH {
            return Err(format!(
                "max_depth must not exceed {}",
                Quadcode::MAX_DEPTH
            ));
        }
        if !self.max_distance_km.is_finite() || self.max_distance_km <= 0.0 {
            return Err("max_distance_km must be finite and positive".to_string());
        }
        if self.cache_capacity == Some(0) {
            return Err("cache_capacity must be greater than zero when set".to_string());
        }
        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            area: Self::default_area(),
            max_points: Self::default_max_points(),
            max_depth: Self::default_max_depth(),
            max_distance_km: Self::default_max_distance_km(),
            distance_metric: DistanceMetric::default(),
            cache_capacity: Self::default_cache_capacity(),
        }
    }
}
