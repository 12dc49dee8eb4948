//! Open-Meteo forecast client.
//!
//! One request returns both the look-back window and the forecast: with
//! `past_days = N` the first N entries of every daily series are history,
//! the rest start today.

use crate::{check_status, http_client, network_error, parse_error};
use async_trait::async_trait;
use chrono::NaiveDate;
use farmloop_config::WeatherConfig;
use farmloop_core::error::WeatherError;
use farmloop_core::farm::Coordinates;
use farmloop_core::weather::{CurrentWeather, DailyForecast, WeatherReport, WeatherSource};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "open-meteo";

pub struct OpenMeteoSource {
    base_url: String,
    past_days: u32,
    forecast_days: u32,
    client: reqwest::Client,
}

impl OpenMeteoSource {
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
        past_days: u32,
        forecast_days: u32,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            past_days,
            forecast_days,
            client: http_client(user_agent, timeout),
        }
    }

    pub fn from_config(config: &WeatherConfig) -> Self {
        Self::new(
            &config.forecast_url,
            &config.user_agent,
            Duration::from_secs(config.timeout_secs),
            config.past_days,
            config.forecast_days,
        )
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    current: Option<CurrentBlock>,
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    #[serde(default)]
    temperature_2m: Option<f64>,
    #[serde(default)]
    precipitation: Option<f64>,
    #[serde(default)]
    relative_humidity_2m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    time: Vec<String>,
    rain_sum: Vec<Option<f64>>,
    temperature_2m_max: Vec<Option<f64>>,
}

impl ForecastResponse {
    /// Split the daily series into history and forecast.
    fn into_report(
        self,
        past_days: usize,
        coordinates: &Coordinates,
    ) -> Result<WeatherReport, WeatherError> {
        let no_forecast = || WeatherError::NoForecast {
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        };

        let daily = self.daily.ok_or_else(no_forecast)?;
        if daily.rain_sum.len() != daily.time.len()
            || daily.temperature_2m_max.len() != daily.time.len()
        {
            return Err(parse_error(SERVICE, "daily series have different lengths"));
        }

        let mut days = Vec::with_capacity(daily.time.len());
        for ((time, rain), max_temp) in daily
            .time
            .iter()
            .zip(daily.rain_sum)
            .zip(daily.temperature_2m_max)
        {
            let date = NaiveDate::parse_from_str(time, "%Y-%m-%d")
                .map_err(|e| parse_error(SERVICE, format!("date '{time}': {e}")))?;
            days.push(DailyForecast {
                date,
                rain_mm: rain.unwrap_or(0.0),
                max_temp_c: max_temp.unwrap_or(f64::NAN),
            });
        }

        let split = past_days.min(days.len());
        let forecast: Vec<DailyForecast> = days
            .split_off(split)
            .into_iter()
            .filter(|d| d.max_temp_c.is_finite())
            .collect();
        if forecast.is_empty() {
            return Err(no_forecast());
        }
        let history: Vec<&DailyForecast> =
            days.iter().filter(|d| d.max_temp_c.is_finite()).collect();

        let rain_last = days.iter().map(|d| d.rain_mm).sum();
        let avg_max_last = if history.is_empty() {
            forecast[0].max_temp_c
        } else {
            history.iter().map(|d| d.max_temp_c).sum::<f64>() / history.len() as f64
        };

        let current = self.current.unwrap_or(CurrentBlock {
            temperature_2m: None,
            precipitation: None,
            relative_humidity_2m: None,
        });

        Ok(WeatherReport {
            current: CurrentWeather {
                temperature_c: current.temperature_2m.unwrap_or(forecast[0].max_temp_c),
                precipitation_mm: current.precipitation.unwrap_or(0.0),
                relative_humidity: current.relative_humidity_2m,
                rain_last_3_days_mm: rain_last,
                avg_max_temp_last_3_days_c: avg_max_last,
            },
            forecast,
        })
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoSource {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn fetch(&self, coordinates: &Coordinates) -> Result<WeatherReport, WeatherError> {
        debug!(%coordinates, "Fetching forecast");

        let response = self
            .client
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[
                ("latitude", coordinates.latitude.to_string()),
                ("longitude", coordinates.longitude.to_string()),
                ("daily", "rain_sum,temperature_2m_max".to_string()),
                (
                    "current",
                    "temperature_2m,precipitation,relative_humidity_2m".to_string(),
                ),
                ("past_days", self.past_days.to_string()),
                ("forecast_days", self.forecast_days.to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;

        let body: ForecastResponse = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| parse_error(SERVICE, e))?;

        body.into_report(self.past_days as usize, coordinates)
    }
}
