//! Server configuration read from the environment at startup.

use std::str::FromStr;

/// Smallest accepted search radius, in miles.
pub const MIN_RADIUS_MILES: f64 = 0.5;

/// Largest accepted search radius, in miles.
pub const MAX_RADIUS_MILES: f64 = 50.0;

/// Radius used when the request does not give one.
pub const DEFAULT_RADIUS_MILES: f64 = 1.0;

/// Area that risk-zone searches may be centered in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionBounds {
    /// Southern bound.
    pub min_lat: f64,
    /// Northern bound.
    pub max_lat: f64,
    /// Western bound.
    pub min_lon: f64,
    /// Eastern bound.
    pub max_lon: f64,
}

impl Default for RegionBounds {
    /// The greater Capital Region, New York.
    fn default() -> Self {
        Self {
            min_lat: 42.0,
            max_lat: 43.0,
            min_lon: -74.5,
            max_lon: -73.5,
        }
    }
}

impl RegionBounds {
    /// Whether the point lies inside the region or on its edge.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Runtime configuration of the API server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Interface to listen on.
    pub bind_addr: String,
    /// Port to listen on.
    pub port: u16,
    /// Region risk-zone searches are limited to.
    pub region: RegionBounds,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            region: RegionBounds::default(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Reads `BIND_ADDR`, `PORT`, `REGION_MIN_LAT`, `REGION_MAX_LAT`,
    /// `REGION_MIN_LON`, `REGION_MAX_LON` and `CORS_ORIGINS`. Unset or
    /// unparsable values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let region = defaults.region;

        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: var_or(&lookup, "PORT", defaults.port),
            region: RegionBounds {
                min_lat: var_or(&lookup, "REGION_MIN_LAT", region.min_lat),
                max_lat: var_or(&lookup, "REGION_MAX_LAT", region.max_lat),
                min_lon: var_or(&lookup, "REGION_MIN_LON", region.min_lon),
                max_lon: var_or(&lookup, "REGION_MAX_LON", region.max_lon),
            },
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn var_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable {key}={raw:?}");
            default
        }),
    }
}
