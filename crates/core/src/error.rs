//! Error types for the FarmLoop domain.
//!
//! Uses `thiserror` for ergonomic error definitions. The three variants a
//! farmer can see ([`Error::DataUnavailable`], [`Error::GenerationFailure`],
//! [`Error::Validation`]) wrap the bounded-context errors below.

use chrono::NaiveDate;
use thiserror::Error;

/// The top-level error type for all FarmLoop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Location / weather / soil lookups ---
    #[error("Data unavailable: {0}")]
    DataUnavailable(#[from] WeatherError),

    // --- LLM generation ---
    #[error("Advice generation failed after {attempts} attempt(s): {reason}")]
    GenerationFailure { attempts: u32, reason: String },

    // --- Farmer input ---
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum WeatherError {
    #[error("No location found for '{0}'")]
    LocationNotFound(String),

    #[error("No forecast returned for ({latitude:.4}, {longitude:.4})")]
    NoForecast { latitude: f64, longitude: f64 },

    #[error("{service} returned status {status_code}: {message}")]
    ApiError {
        service: String,
        status_code: u16,
        message: String,
    },

    #[error("{service} unreachable: {reason}")]
    Network { service: String, reason: String },

    #[error("Unexpected {service} response: {reason}")]
    Parse { service: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("'{value}' is not a valid date (expected YYYY-MM-DD)")]
    InvalidDate { value: String },

    #[error("Sowing date {sowing_date} is after {today}")]
    SowingInFuture {
        sowing_date: NaiveDate,
        today: NaiveDate,
    },
}
