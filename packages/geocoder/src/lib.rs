#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Address search for the risk map.
//!
//! Proxies free-form queries to Nominatim / OpenStreetMap, biased to the
//! Capital Region. The service is configured via `services/nominatim.toml`
//! (see [`service_registry`]) and the raw result objects are returned
//! unchanged.

pub mod nominatim;
pub mod service_registry;

use thiserror::Error;

pub use nominatim::NominatimClient;
pub use service_registry::NominatimService;

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed or the service returned an error status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}
