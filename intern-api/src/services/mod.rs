//! External service clients

pub mod geocoding;

pub use geocoding::{DisabledGeocoder, GoogleMapsGeocoder};
