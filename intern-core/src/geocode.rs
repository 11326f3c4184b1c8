//! Address geocoding seam

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::CoreResult;
use crate::geo::GeoPoint;
use crate::types::PostalAddress;

/// Resolves postal addresses to coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the provider has no match for the address
    async fn geocode(&self, address: &PostalAddress) -> CoreResult<Option<GeoPoint>>;
}

/// Fixed lookup table keyed by `PostalAddress::to_query`
#[derive(Debug, Default, Clone)]
pub struct StaticGeocoder {
    entries: HashMap<String, GeoPoint>,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, address: &PostalAddress, point: GeoPoint) -> Self {
        self.entries.insert(address.to_query(), point);
        self
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, address: &PostalAddress) -> CoreResult<Option<GeoPoint>> {
        Ok(self.entries.get(&address.to_query()).copied())
    }
}
