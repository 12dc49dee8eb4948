//! Shared test helpers for generator and loop tests.

use chrono::{NaiveDate, Utc};
use farmloop_core::error::ProviderError;
use farmloop_core::farm::{Coordinates, FarmContext, SoilType};
use farmloop_core::message::Message;
use farmloop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use farmloop_core::stage::CropStage;
use farmloop_core::weather::{PrecipitationCategory, WeatherThresholds};
use farmloop_weather::mock::{forecast, report};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted results.
///
/// Each call to `complete` returns the next result in the queue.
/// Panics if more calls are made than results provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One valid week per prefix, in order.
    pub fn weeks(prefixes: &[&str]) -> Self {
        Self::new(
            prefixes
                .iter()
                .map(|p| Ok(make_text_response(&week_reply(p))))
                .collect(),
        )
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let call = requests.len();

        if call >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{call}, have {})",
                responses.len()
            );
        }

        requests.push(request);
        responses[call].clone()
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// A valid seven-line plan whose actions read "`prefix` on day N".
pub fn week_reply(prefix: &str) -> String {
    let mut text = format!("{prefix} plan for the week.\n");
    for day in 1..=7 {
        text.push_str(&format!("Day {day}: {prefix} on day {day}\n"));
    }
    text
}

/// Forecast rain amounts that classify as `category` under default thresholds.
pub fn rain_for(category: PrecipitationCategory) -> [f64; 7] {
    match category {
        PrecipitationCategory::Sunny => [0.0; 7],
        PrecipitationCategory::LightRain => [0.0, 1.0, 2.0, 1.0, 0.0, 0.0, 0.0],
        PrecipitationCategory::ModerateRain => [4.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        PrecipitationCategory::HeavyRain => [32.0, 12.0, 4.0, 0.0, 0.0, 1.0, 0.0],
    }
}

/// Wheat sown 2024-01-01, seen on 2024-01-30 (vegetative), at 24 °C.
pub fn wheat_context(category: PrecipitationCategory) -> FarmContext {
    let today = NaiveDate::from_ymd_opt(2024, 1, 30).unwrap();
    let weather = report(forecast(today, &rain_for(category), 24.0));
    let thresholds = WeatherThresholds::default();
    FarmContext {
        crop: "wheat".into(),
        sowing_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        location: "Ludhiana, Punjab".into(),
        coordinates: Coordinates::new(30.901, 75.857),
        soil_type: SoilType::Loamy,
        precipitation: thresholds.precipitation_category(&weather.forecast),
        temperature_band: thresholds.temperature_band(&weather.forecast),
        current_weather: weather.current,
        forecast_weather: weather.forecast,
        derived_soil_moisture: 0.3,
        crop_stage: CropStage::Vegetative,
        elapsed_days: 29,
        as_of: today,
        observed_at: Utc::now(),
    }
}
