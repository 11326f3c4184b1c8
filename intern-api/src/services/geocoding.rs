//! Google Maps geocoding client

use async_trait::async_trait;
use intern_core::{CoreError, CoreResult, GeoPoint, Geocoder, PostalAddress};
use serde::Deserialize;
use std::time::Duration;

/// Geocoding endpoint
pub const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// First result's coordinates, `None` on ZERO_RESULTS
fn parse_response(body: GeocodeResponse) -> CoreResult<Option<GeoPoint>> {
    match body.status.as_str() {
        "OK" => match body.results.first() {
            Some(result) => {
                let loc = &result.geometry.location;
                GeoPoint::new(loc.lat, loc.lng).map(Some)
            }
            None => Ok(None),
        },
        "ZERO_RESULTS" => Ok(None),
        status => Err(CoreError::Geocoding(format!(
            "provider returned {}: {}",
            status,
            body.error_message.unwrap_or_default()
        ))),
    }
}

/// Geocoder backed by the Google Geocoding API
pub struct GoogleMapsGeocoder {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleMapsGeocoder {
    pub fn new(api_key: impl Into<String>) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CoreError::Geocoding(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: GOOGLE_GEOCODE_URL.to_string(),
        })
    }

    /// Read the key from `GOOGLE_MAPS_API_KEY`; `None` when unset
    pub fn from_env() -> CoreResult<Option<Self>> {
        match std::env::var("GOOGLE_MAPS_API_KEY") {
            Ok(key) if !key.is_empty() => Self::new(key).map(Some),
            _ => Ok(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Geocoder for GoogleMapsGeocoder {
    async fn geocode(&self, address: &PostalAddress) -> CoreResult<Option<GeoPoint>> {
        let query = address.to_query();
        tracing::debug!(query = %query, "Geocoding address");

        let response = self
            .http
            .get(&self.base_url)
            .query(&[("address", query.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| CoreError::Geocoding(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CoreError::Geocoding(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Geocoding(e.to_string()))?;

        parse_response(body)
    }
}

/// Fallback when no provider is configured: every address is an error
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn geocode(&self, _address: &PostalAddress) -> CoreResult<Option<GeoPoint>> {
        Err(CoreError::Geocoding(
            "no geocoding provider configured; register the site by coordinates".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> CoreResult<Option<GeoPoint>> {
        parse_response(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_parse_ok() {
        let point = parse(
            r#"{"status":"OK","results":[{"geometry":{"location":{"lat":38.7105,"lng":-9.1366}}}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(point.latitude, 38.7105);
        assert_eq!(point.longitude, -9.1366);
    }

    #[test]
    fn test_parse_zero_results() {
        assert!(parse(r#"{"status":"ZERO_RESULTS","results":[]}"#).unwrap().is_none());
    }

    #[test]
    fn test_parse_denied() {
        let err = parse(r#"{"status":"REQUEST_DENIED","error_message":"bad key"}"#).unwrap_err();
        assert!(matches!(err, CoreError::Geocoding(msg) if msg.contains("bad key")));
    }
}
