//! Compile-time Nominatim service configuration.
//!
//! The service is defined in `services/nominatim.toml` and embedded at
//! compile time. The base URL can be overridden at runtime, which is how a
//! self-hosted instance is selected.

use std::time::Duration;

use serde::Deserialize;

/// Environment variable overriding the Nominatim search URL.
pub const NOMINATIM_URL_ENV: &str = "NOMINATIM_URL";

/// Nominatim search configuration loaded from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NominatimService {
    /// Unique identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Search endpoint (e.g., `"https://nominatim.openstreetmap.org/search"`).
    pub base_url: String,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Per-attempt request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum results per attempt.
    pub limit: u32,
    /// Comma-separated ISO country codes.
    pub country_codes: String,
    /// `west,south,east,north` box results are biased (or bounded) to.
    pub viewbox: String,
    /// Whether results outside the viewbox are discarded.
    #[serde(default)]
    pub bounded: bool,
    /// Suffixes appended to the query, tried in order.
    pub query_suffixes: Vec<String>,
}

const NOMINATIM_TOML: &str = include_str!("../services/nominatim.toml");

impl NominatimService {
    /// Returns the embedded configuration.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (this is a compile-time
    /// guarantee since the config is embedded).
    #[must_use]
    pub fn builtin() -> Self {
        toml::de::from_str(NOMINATIM_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse geocoding service 'nominatim': {e}"))
    }

    /// Returns the embedded configuration with `NOMINATIM_URL` applied.
    #[must_use]
    pub fn from_env() -> Self {
        let service = Self::builtin();
        match std::env::var(NOMINATIM_URL_ENV) {
            Ok(url) if !url.is_empty() => service.with_base_url(url),
            _ => service,
        }
    }

    /// Replaces the search endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Per-attempt request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_builtin_service() {
        let service = NominatimService::builtin();
        assert_eq!(service.id, "nominatim");
        assert!(!service.name.is_empty());
        assert_eq!(service.base_url, "https://nominatim.openstreetmap.org/search");
        assert_eq!(service.user_agent, "CrimeRiskPredictor/1.0");
        assert_eq!(service.timeout(), Duration::from_secs(10));
        assert_eq!(service.limit, 5);
        assert_eq!(service.country_codes, "us");
        assert_eq!(service.viewbox, "-74.9865,41.4775,-72.9322,44.0081");
        assert!(service.bounded);
    }

    #[test]
    fn bare_query_is_tried_last() {
        let service = NominatimService::builtin();
        assert_eq!(
            service.query_suffixes,
            vec![", New York, USA", ", NY, USA", ""]
        );
    }

    #[test]
    fn base_url_can_be_replaced() {
        let service = NominatimService::builtin().with_base_url("http://localhost:8088/search");
        assert_eq!(service.base_url, "http://localhost:8088/search");
        assert_eq!(service.limit, 5);
    }
}
