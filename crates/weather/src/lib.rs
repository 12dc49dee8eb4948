//! # FarmLoop Weather
//!
//! HTTP collaborators that turn a place name into the facts the advisory
//! loop reasons about:
//!
//! - [`NominatimResolver`]: place name → coordinates (OpenStreetMap)
//! - [`OpenMeteoSource`]: coordinates → current conditions, recent history
//!   and a daily forecast
//! - [`SoilGridsSource`]: coordinates → coarse topsoil class (ISRIC)
//!
//! [`mock`] holds scripted stand-ins used by tests and offline runs.

pub mod mock;
pub mod nominatim;
pub mod open_meteo;
pub mod soilgrids;

pub use nominatim::NominatimResolver;
pub use open_meteo::OpenMeteoSource;
pub use soilgrids::SoilGridsSource;

use farmloop_core::error::WeatherError;
use std::time::Duration;

/// Build an HTTP client with the shared user agent and timeout.
pub(crate) fn http_client(user_agent: &str, timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

pub(crate) fn network_error(service: &str, e: reqwest::Error) -> WeatherError {
    WeatherError::Network {
        service: service.into(),
        reason: e.to_string(),
    }
}

pub(crate) fn parse_error(service: &str, reason: impl ToString) -> WeatherError {
    WeatherError::Parse {
        service: service.into(),
        reason: reason.to_string(),
    }
}

/// Map a non-success response to an API error, consuming the body.
pub(crate) async fn check_status(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, WeatherError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    tracing::warn!(service, status = status.as_u16(), body = %message, "Lookup failed");
    Err(WeatherError::ApiError {
        service: service.into(),
        status_code: status.as_u16(),
        message,
    })
}
