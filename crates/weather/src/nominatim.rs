//! OpenStreetMap Nominatim geocoder.

use crate::{check_status, http_client, network_error, parse_error};
use async_trait::async_trait;
use farmloop_config::WeatherConfig;
use farmloop_core::error::WeatherError;
use farmloop_core::farm::Coordinates;
use farmloop_core::weather::LocationResolver;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "nominatim";

/// Resolves free-form place names through `GET /search`.
///
/// Nominatim rejects requests without an identifying `User-Agent`, so one
/// is always sent. An empty result list is [`WeatherError::LocationNotFound`];
/// there is no fallback location.
pub struct NominatimResolver {
    base_url: String,
    client: reqwest::Client,
}

impl NominatimResolver {
    pub fn new(base_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(user_agent, timeout),
        }
    }

    pub fn from_config(config: &WeatherConfig) -> Self {
        Self::new(
            &config.geocoder_url,
            &config.user_agent,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[async_trait]
impl LocationResolver for NominatimResolver {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn resolve(&self, location: &str) -> Result<Coordinates, WeatherError> {
        debug!(location, "Geocoding");

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", location), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;

        let places: Vec<Place> = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| parse_error(SERVICE, e))?;

        let place = places
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError::LocationNotFound(location.to_string()))?;

        let latitude = place
            .lat
            .parse::<f64>()
            .map_err(|e| parse_error(SERVICE, format!("lat '{}': {e}", place.lat)))?;
        let longitude = place
            .lon
            .parse::<f64>()
            .map_err(|e| parse_error(SERVICE, format!("lon '{}': {e}", place.lon)))?;

        Ok(Coordinates {
            latitude,
            longitude,
            display_name: place.display_name,
        })
    }
}
