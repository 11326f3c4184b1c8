//! Time-clock API server

use std::sync::Arc;

use intern_api::services::{DisabledGeocoder, GoogleMapsGeocoder};
use intern_api::telemetry::{init_logging, LogConfig};
use intern_api::{start_server, JwtConfig, ServerConfig};
use intern_core::Geocoder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(&LogConfig::from_env())?;

    let config = ServerConfig::from_env();
    let jwt = JwtConfig::try_from_env()?;

    let geocoder: Arc<dyn Geocoder> = match GoogleMapsGeocoder::from_env()? {
        Some(google) => Arc::new(google),
        None => {
            tracing::warn!("GOOGLE_MAPS_API_KEY not set; sites must be registered by coordinates");
            Arc::new(DisabledGeocoder)
        }
    };

    start_server(config, jwt, geocoder).await
}
