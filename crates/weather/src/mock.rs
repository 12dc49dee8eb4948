//! Scripted collaborators for tests and offline runs.
//!
//! [`ScriptedWeather`] returns a fixed sequence of reports, one per fetch,
//! repeating the last once the script runs out. [`forecast`] builds a week of
//! daily entries from a list of rain amounts.

use async_trait::async_trait;
use chrono::NaiveDate;
use farmloop_core::error::WeatherError;
use farmloop_core::farm::{Coordinates, SoilType};
use farmloop_core::weather::{
    CurrentWeather, DailyForecast, LocationResolver, SoilSource, WeatherReport, WeatherSource,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Daily entries starting at `start`, one per rain amount, all at `max_temp_c`.
pub fn forecast(start: NaiveDate, rain_mm: &[f64], max_temp_c: f64) -> Vec<DailyForecast> {
    rain_mm
        .iter()
        .enumerate()
        .map(|(i, rain)| DailyForecast {
            date: start + chrono::Days::new(i as u64),
            rain_mm: *rain,
            max_temp_c,
        })
        .collect()
}

/// A report with mild recent conditions and the given forecast.
pub fn report(forecast: Vec<DailyForecast>) -> WeatherReport {
    let temperature_c = forecast.first().map(|d| d.max_temp_c).unwrap_or(25.0);
    WeatherReport {
        current: CurrentWeather {
            temperature_c,
            precipitation_mm: 0.0,
            relative_humidity: Some(55.0),
            rain_last_3_days_mm: 0.0,
            avg_max_temp_last_3_days_c: temperature_c,
        },
        forecast,
    }
}

/// A dry week at `max_temp_c`.
pub fn sunny_week(start: NaiveDate, max_temp_c: f64) -> WeatherReport {
    report(forecast(start, &[0.0; 7], max_temp_c))
}

/// A week with a downpour on the first day.
pub fn heavy_rain_week(start: NaiveDate, max_temp_c: f64) -> WeatherReport {
    report(forecast(
        start,
        &[32.0, 12.0, 4.0, 0.0, 0.0, 1.0, 0.0],
        max_temp_c,
    ))
}

/// Returns scripted reports in order, then repeats the last one.
pub struct ScriptedWeather {
    script: Vec<Result<WeatherReport, WeatherError>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Coordinates>>,
}

impl ScriptedWeather {
    pub fn new(reports: Vec<WeatherReport>) -> Self {
        Self::with_results(reports.into_iter().map(Ok).collect())
    }

    /// A script that may include failures.
    pub fn with_results(script: Vec<Result<WeatherReport, WeatherError>>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Coordinates passed to each fetch, in order.
    pub fn requested(&self) -> Vec<Coordinates> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WeatherSource for ScriptedWeather {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, coordinates: &Coordinates) -> Result<WeatherReport, WeatherError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(coordinates.clone());
        }
        match self.script.get(call).or_else(|| self.script.last()) {
            Some(result) => result.clone(),
            None => Err(WeatherError::NoForecast {
                latitude: coordinates.latitude,
                longitude: coordinates.longitude,
            }),
        }
    }
}

/// Resolves every location to the same coordinates, or to nothing.
pub struct StaticResolver {
    coordinates: Option<Coordinates>,
    calls: AtomicUsize,
}

impl StaticResolver {
    pub fn new(coordinates: Coordinates) -> Self {
        Self {
            coordinates: Some(coordinates),
            calls: AtomicUsize::new(0),
        }
    }

    /// A resolver that never finds anything.
    pub fn not_found() -> Self {
        Self {
            coordinates: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationResolver for StaticResolver {
    fn name(&self) -> &str {
        "static"
    }

    async fn resolve(&self, location: &str) -> Result<Coordinates, WeatherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.coordinates
            .clone()
            .ok_or_else(|| WeatherError::LocationNotFound(location.to_string()))
    }
}

/// Always reports the same soil, or always fails.
pub struct StaticSoil(pub Option<SoilType>);

#[async_trait]
impl SoilSource for StaticSoil {
    fn name(&self) -> &str {
        "static"
    }

    async fn soil_type(&self, _coordinates: &Coordinates) -> Result<SoilType, WeatherError> {
        self.0.ok_or_else(|| WeatherError::Network {
            service: "static".into(),
            reason: "soil lookup disabled".into(),
        })
    }
}
