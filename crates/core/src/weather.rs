//! Weather records, forecast classification, and the collaborator traits for
//! location, weather, and soil lookups.
//!
//! The advisory loop only ever reasons about two coarse signals derived from a
//! forecast: a [`PrecipitationCategory`] and a [`TemperatureBand`]. Both are
//! computed here by [`WeatherThresholds`] so that the context builder and the
//! change detector agree on the same cut-offs.

use crate::error::WeatherError;
use crate::farm::{Coordinates, SoilType};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conditions now plus a short look back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    /// Air temperature at 2 m
    pub temperature_c: f64,

    /// Precipitation in the current hour
    pub precipitation_mm: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_humidity: Option<f64>,

    /// Rain accumulated over the look-back window
    pub rain_last_3_days_mm: f64,

    /// Mean daily maximum over the look-back window
    pub avg_max_temp_last_3_days_c: f64,
}

/// One forecast day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub rain_mm: f64,
    pub max_temp_c: f64,
}

/// Everything a weather source returns for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub current: CurrentWeather,

    /// Ordered by date, today first
    pub forecast: Vec<DailyForecast>,
}

/// Coarse rain outlook for the forecast window. Ordered from driest to wettest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecipitationCategory {
    Sunny,
    LightRain,
    ModerateRain,
    HeavyRain,
}

impl PrecipitationCategory {
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrecipitationCategory::Sunny => "sunny",
            PrecipitationCategory::LightRain => "light rain",
            PrecipitationCategory::ModerateRain => "moderate rain",
            PrecipitationCategory::HeavyRain => "heavy rain",
        }
    }

    /// Whether irrigation should be held back under this outlook.
    pub fn expects_rain(&self) -> bool {
        *self >= PrecipitationCategory::ModerateRain
    }
}

impl fmt::Display for PrecipitationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mean forecast maximum temperature, bucketed by a fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureBand {
    /// `floor(mean_max_temp / width_c)`
    pub index: i32,
    pub width_c: f64,
}

impl TemperatureBand {
    /// Absolute number of bands between two readings.
    pub fn distance(&self, other: &TemperatureBand) -> u32 {
        self.index.abs_diff(other.index)
    }

    pub fn lower_c(&self) -> f64 {
        f64::from(self.index) * self.width_c
    }

    pub fn upper_c(&self) -> f64 {
        self.lower_c() + self.width_c
    }
}

impl fmt::Display for TemperatureBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} to {:.0} °C", self.lower_c(), self.upper_c())
    }
}

/// Cut-offs used to classify a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherThresholds {
    /// Any single day above this is heavy rain
    pub heavy_rain_mm: f64,

    /// More than this over the next two days means rain is expected
    pub rain_expected_mm: f64,

    /// Less than this over the next five days is a dry spell
    pub dry_spell_mm: f64,

    /// Width of one temperature band
    pub temperature_band_c: f64,
}

impl Default for WeatherThresholds {
    fn default() -> Self {
        Self {
            heavy_rain_mm: 20.0,
            rain_expected_mm: 5.0,
            dry_spell_mm: 2.0,
            temperature_band_c: 5.0,
        }
    }
}

impl WeatherThresholds {
    /// Classify the forecast rain outlook. Heavy rain wins over expected rain,
    /// which wins over a dry spell.
    pub fn precipitation_category(&self, forecast: &[DailyForecast]) -> PrecipitationCategory {
        if forecast.iter().any(|d| d.rain_mm > self.heavy_rain_mm) {
            PrecipitationCategory::HeavyRain
        } else if rain_over(forecast, 2) > self.rain_expected_mm {
            PrecipitationCategory::ModerateRain
        } else if rain_over(forecast, 5) < self.dry_spell_mm {
            PrecipitationCategory::Sunny
        } else {
            PrecipitationCategory::LightRain
        }
    }

    pub fn temperature_band(&self, forecast: &[DailyForecast]) -> TemperatureBand {
        TemperatureBand {
            index: (mean_max_temp(forecast) / self.temperature_band_c).floor() as i32,
            width_c: self.temperature_band_c,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.temperature_band_c <= 0.0 {
            return Err("temperature_band_c must be > 0".into());
        }
        if self.heavy_rain_mm <= 0.0 || self.rain_expected_mm < 0.0 || self.dry_spell_mm < 0.0 {
            return Err("rain thresholds must be non-negative (heavy_rain_mm > 0)".into());
        }
        Ok(())
    }
}

/// Rain summed over the first `days` forecast days.
pub fn rain_over(forecast: &[DailyForecast], days: usize) -> f64 {
    forecast.iter().take(days).map(|d| d.rain_mm).sum()
}

/// Mean daily maximum over the whole forecast, 0 when empty.
pub fn mean_max_temp(forecast: &[DailyForecast]) -> f64 {
    if forecast.is_empty() {
        return 0.0;
    }
    forecast.iter().map(|d| d.max_temp_c).sum::<f64>() / forecast.len() as f64
}

/// Resolves a free-form place name ("Wardha, Maharashtra") to coordinates.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, location: &str) -> std::result::Result<Coordinates, WeatherError>;
}

/// Fetches current conditions and a daily forecast for coordinates.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(
        &self,
        coordinates: &Coordinates,
    ) -> std::result::Result<WeatherReport, WeatherError>;
}

/// Classifies the topsoil at coordinates.
#[async_trait]
pub trait SoilSource: Send + Sync {
    fn name(&self) -> &str;

    async fn soil_type(
        &self,
        coordinates: &Coordinates,
    ) -> std::result::Result<SoilType, WeatherError>;
}
