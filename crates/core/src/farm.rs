//! Farmer input and the per-iteration farm context snapshot.

use crate::error::ValidationError;
use crate::stage::CropStage;
use crate::weather::{
    mean_max_temp, rain_over, CurrentWeather, DailyForecast, PrecipitationCategory,
    TemperatureBand,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one advisory session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the farmer tells us once, at the start of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmInput {
    pub crop: String,
    pub sowing_date: NaiveDate,
    pub location: String,
}

impl FarmInput {
    /// Validate raw strings into a farm input.
    ///
    /// Crop and location must be non-empty after trimming. The sowing date
    /// accepts `YYYY-MM-DD` and `DD-MM-YYYY`.
    pub fn parse(crop: &str, sowing_date: &str, location: &str) -> Result<Self, ValidationError> {
        let crop = crop.trim();
        if crop.is_empty() {
            return Err(ValidationError::EmptyField("crop"));
        }
        let location = location.trim();
        if location.is_empty() {
            return Err(ValidationError::EmptyField("location"));
        }
        Ok(Self {
            crop: crop.to_string(),
            sowing_date: parse_date(sowing_date)?,
            location: location.to_string(),
        })
    }

    /// Days elapsed between sowing and `today`.
    ///
    /// A sowing date in the future is rejected rather than clamped.
    pub fn elapsed_days(&self, today: NaiveDate) -> Result<u32, ValidationError> {
        let days = (today - self.sowing_date).num_days();
        if days < 0 {
            return Err(ValidationError::SowingInFuture {
                sowing_date: self.sowing_date,
                today,
            });
        }
        Ok(u32::try_from(days).unwrap_or(u32::MAX))
    }
}

/// Parse a calendar date in `YYYY-MM-DD` or `DD-MM-YYYY` form.
pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d-%m-%Y"))
        .map_err(|_| ValidationError::InvalidDate {
            value: value.to_string(),
        })
}

/// A resolved location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,

    /// The resolver's canonical name for the place, if it returned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            display_name: None,
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Coarse topsoil class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoilType {
    Clayey,
    Sandy,
    LoamyFertile,
    #[default]
    Loamy,
}

impl SoilType {
    /// Classify from topsoil fractions: clay and sand in percent, soil
    /// organic carbon in g/kg.
    pub fn classify(clay_pct: f64, sand_pct: f64, soc_g_per_kg: Option<f64>) -> Self {
        if clay_pct > 40.0 {
            SoilType::Clayey
        } else if sand_pct > 60.0 {
            SoilType::Sandy
        } else if soc_g_per_kg.is_some_and(|soc| soc > 15.0) {
            SoilType::LoamyFertile
        } else {
            SoilType::Loamy
        }
    }

    /// Shift applied to the moisture index: clay holds water, sand drains.
    pub fn retention(&self) -> f64 {
        match self {
            SoilType::Clayey => 0.1,
            SoilType::Sandy => -0.1,
            SoilType::LoamyFertile => 0.05,
            SoilType::Loamy => 0.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SoilType::Clayey => "clayey / black soil",
            SoilType::Sandy => "sandy soil",
            SoilType::LoamyFertile => "loamy fertile soil",
            SoilType::Loamy => "loamy soil",
        }
    }
}

impl fmt::Display for SoilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable snapshot of everything known about the farm for one iteration.
///
/// A new snapshot is built on every loop pass; nothing mutates an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmContext {
    pub crop: String,
    pub sowing_date: NaiveDate,
    pub location: String,
    pub coordinates: Coordinates,
    pub soil_type: SoilType,
    pub current_weather: CurrentWeather,
    pub forecast_weather: Vec<DailyForecast>,

    /// Moisture index in `[0, 1]`
    pub derived_soil_moisture: f64,

    pub crop_stage: CropStage,
    pub elapsed_days: u32,

    /// The date the stage was computed for
    pub as_of: NaiveDate,

    pub precipitation: PrecipitationCategory,
    pub temperature_band: TemperatureBand,
    pub observed_at: DateTime<Utc>,
}

impl FarmContext {
    /// Rain forecast over the next two days.
    pub fn rain_next_48h_mm(&self) -> f64 {
        rain_over(&self.forecast_weather, 2)
    }

    /// Mean forecast daily maximum.
    pub fn mean_max_temp_c(&self) -> f64 {
        mean_max_temp(&self.forecast_weather)
    }
}
