//! Geographic primitives
//!
//! Points, circular geofences and great-circle distance. Everything here is
//! pure and synchronous.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A (latitude, longitude) pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting out-of-range or non-finite coordinates
    pub fn new(latitude: f64, longitude: f64) -> CoreResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoreError::validation(format!(
                "latitude {} out of range [-90, 90]",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoreError::validation(format!(
                "longitude {} out of range [-180, 180]",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance to `other` in meters
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_km(self, other) * 1000.0
    }
}

/// Haversine distance between two points, in kilometers
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h marginally above 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * c
}

/// Circular region around a center point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub center: GeoPoint,
    pub radius_m: f64,
}

impl Geofence {
    pub fn new(center: GeoPoint, radius_m: f64) -> CoreResult<Self> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(CoreError::validation(format!(
                "geofence radius must be positive, got {}",
                radius_m
            )));
        }
        Ok(Self { center, radius_m })
    }

    /// Distance from the center to `point`, in meters
    pub fn distance_m(&self, point: &GeoPoint) -> f64 {
        self.center.distance_m(point)
    }

    /// Boundary inclusive
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.distance_m(point) <= self.radius_m
    }
}
