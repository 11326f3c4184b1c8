//! Work sites

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::SiteId;
use crate::error::CoreResult;
use crate::geo::{GeoPoint, Geofence};

/// Postal address a site may be registered by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub postal_code: Option<String>,
    pub street: String,
    pub number: Option<String>,
    pub district: Option<String>,
    pub city: String,
    pub state: String,
}

impl PostalAddress {
    /// Single-line form used as a geocoder query
    pub fn to_query(&self) -> String {
        let mut parts: Vec<&str> = vec![self.street.as_str()];
        if let Some(number) = self.number.as_deref() {
            parts.push(number);
        }
        if let Some(district) = self.district.as_deref() {
            parts.push(district);
        }
        parts.push(self.city.as_str());
        parts.push(self.state.as_str());
        if let Some(postal_code) = self.postal_code.as_deref() {
            parts.push(postal_code);
        }
        parts
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Authorized work site: a named geofence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    pub center: GeoPoint,
    pub radius_m: f64,
    /// Address the center was geocoded from, if any
    pub address: Option<PostalAddress>,
    pub created_at: DateTime<Utc>,
}

impl Site {
    pub fn geofence(&self) -> CoreResult<Geofence> {
        Geofence::new(self.center, self.radius_m)
    }
}

/// How a new site's center is given
#[derive(Debug, Clone)]
pub enum SiteLocation {
    Coordinates(GeoPoint),
    Address(PostalAddress),
}

/// Input for registering a site
#[derive(Debug, Clone)]
pub struct NewSite {
    pub name: String,
    pub location: SiteLocation,
    /// Falls back to the policy default when absent
    pub radius_m: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_query_skips_missing_parts() {
        let address = PostalAddress {
            postal_code: None,
            street: "Rua Augusta".to_string(),
            number: Some("100".to_string()),
            district: None,
            city: "Lisboa".to_string(),
            state: "LX".to_string(),
        };
        assert_eq!(address.to_query(), "Rua Augusta, 100, Lisboa, LX");
    }
}
