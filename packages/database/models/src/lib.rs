#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Database row types and query parameter definitions.
//!
//! These types represent the shapes of data as stored in and retrieved from
//! the `PostGIS` database. They are distinct from the API response types in
//! `risk_map_server_models` and the scoring types in `risk_map_risk_models`.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Whether the box has a non-negative extent on both axes.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.west <= self.east && self.south <= self.north
    }

    /// Whether the point lies inside the box or on its edge.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lon)
    }
}

/// A police station row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoliceStation {
    /// Primary key.
    pub station_id: i32,
    /// Station name.
    pub name: String,
    /// Street address, when known.
    pub address: Option<String>,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
}
