//! Assembles [`FarmContext`] snapshots from farmer input and collaborator data.

use super::clock::{Clock, SystemClock};
use chrono::NaiveDate;
use farmloop_core::error::{Error, Result, WeatherError};
use farmloop_core::farm::{Coordinates, FarmContext, FarmInput, SoilType};
use farmloop_core::stage::StageTable;
use farmloop_core::weather::{
    CurrentWeather, LocationResolver, SoilSource, WeatherReport, WeatherSource, WeatherThresholds,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Moisture index with no recent rain, no heat stress, neutral soil.
const BASE_MOISTURE: f64 = 0.3;

/// Recent rain that alone would saturate the index from zero.
const SATURATING_RAIN_MM: f64 = 50.0;

/// Above this mean daily maximum, evaporation starts drying the topsoil.
const HEAT_STRESS_FROM_C: f64 = 30.0;

/// Index lost per degree above [`HEAT_STRESS_FROM_C`].
const DRYING_PER_DEGREE: f64 = 0.02;

/// Estimate topsoil moisture in `[0, 1]` from the look-back window.
///
/// Rain raises the index, heat above 30 °C lowers it, and the soil class
/// shifts it by its retention.
pub fn estimate_soil_moisture(current: &CurrentWeather, soil: SoilType) -> f64 {
    let wetting = current.rain_last_3_days_mm.max(0.0) / SATURATING_RAIN_MM;
    let drying = (current.avg_max_temp_last_3_days_c - HEAT_STRESS_FROM_C).max(0.0)
        * DRYING_PER_DEGREE;
    (BASE_MOISTURE + wetting - drying + soil.retention()).clamp(0.0, 1.0)
}

/// Builds the per-iteration farm context.
pub struct ContextBuilder {
    resolver: Arc<dyn LocationResolver>,
    weather: Arc<dyn WeatherSource>,
    soil: Option<Arc<dyn SoilSource>>,
    stages: StageTable,
    thresholds: WeatherThresholds,
    clock: Arc<dyn Clock>,
}

impl ContextBuilder {
    pub fn new(resolver: Arc<dyn LocationResolver>, weather: Arc<dyn WeatherSource>) -> Self {
        Self {
            resolver,
            weather,
            soil: None,
            stages: StageTable::builtin(),
            thresholds: WeatherThresholds::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Look up soil type on the first build. Without a soil source every
    /// farm is treated as loamy.
    pub fn with_soil(mut self, soil: Arc<dyn SoilSource>) -> Self {
        self.soil = Some(soil);
        self
    }

    pub fn with_stage_table(mut self, stages: StageTable) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_thresholds(mut self, thresholds: WeatherThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Build the first snapshot of a session.
    ///
    /// Validates the sowing date against today before any network call,
    /// then resolves the location, classifies the soil and fetches weather.
    pub async fn build(&self, input: &FarmInput) -> Result<FarmContext> {
        let today = self.clock.today();
        let elapsed_days = input.elapsed_days(today)?;

        let coordinates = self.resolver.resolve(&input.location).await?;
        info!(
            location = %input.location,
            %coordinates,
            resolver = self.resolver.name(),
            "Resolved location"
        );

        let soil_type = self.soil_type(&coordinates).await;
        let report = self.weather.fetch(&coordinates).await?;

        self.assemble(
            input.clone(),
            coordinates,
            soil_type,
            report,
            today,
            elapsed_days,
        )
    }

    /// Build the next snapshot from the previous one.
    ///
    /// Only the weather is re-fetched; location and soil carry over, and the
    /// crop stage is recomputed for the current date.
    pub async fn refresh(&self, previous: &FarmContext) -> Result<FarmContext> {
        let today = self.clock.today();
        let input = FarmInput {
            crop: previous.crop.clone(),
            sowing_date: previous.sowing_date,
            location: previous.location.clone(),
        };
        let elapsed_days = input.elapsed_days(today)?;
        let report = self.weather.fetch(&previous.coordinates).await?;

        self.assemble(
            input,
            previous.coordinates.clone(),
            previous.soil_type,
            report,
            today,
            elapsed_days,
        )
    }

    async fn soil_type(&self, coordinates: &Coordinates) -> SoilType {
        let Some(source) = &self.soil else {
            return SoilType::default();
        };
        match source.soil_type(coordinates).await {
            Ok(soil) => soil,
            Err(e) => {
                warn!(
                    source = source.name(),
                    error = %e,
                    "Soil lookup failed, assuming loamy soil"
                );
                SoilType::default()
            }
        }
    }

    fn assemble(
        &self,
        input: FarmInput,
        coordinates: Coordinates,
        soil_type: SoilType,
        report: WeatherReport,
        as_of: NaiveDate,
        elapsed_days: u32,
    ) -> Result<FarmContext> {
        if report.forecast.is_empty() {
            return Err(Error::DataUnavailable(WeatherError::NoForecast {
                latitude: coordinates.latitude,
                longitude: coordinates.longitude,
            }));
        }

        let crop_stage = self.stages.stage_for(&input.crop, elapsed_days);
        let precipitation = self.thresholds.precipitation_category(&report.forecast);
        let temperature_band = self.thresholds.temperature_band(&report.forecast);
        let derived_soil_moisture = estimate_soil_moisture(&report.current, soil_type);

        debug!(
            crop = %input.crop,
            elapsed_days,
            stage = %crop_stage,
            %precipitation,
            %temperature_band,
            moisture = derived_soil_moisture,
            "Assembled farm context"
        );

        Ok(FarmContext {
            crop: input.crop,
            sowing_date: input.sowing_date,
            location: input.location,
            coordinates,
            soil_type,
            current_weather: report.current,
            forecast_weather: report.forecast,
            derived_soil_moisture,
            crop_stage,
            elapsed_days,
            as_of,
            precipitation,
            temperature_band,
            observed_at: self.clock.now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::clock::FixedClock;
    use farmloop_core::error::ValidationError;
    use farmloop_core::stage::CropStage;
    use farmloop_core::weather::PrecipitationCategory;
    use farmloop_weather::mock::{
        ScriptedWeather, StaticResolver, StaticSoil, heavy_rain_week, report, sunny_week,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ludhiana() -> Coordinates {
        Coordinates::new(30.901, 75.857)
    }

    fn builder(weather: Arc<ScriptedWeather>, resolver: Arc<StaticResolver>) -> ContextBuilder {
        ContextBuilder::new(resolver, weather)
            .with_clock(Arc::new(FixedClock::new(date(2024, 1, 30))))
    }

    fn wheat() -> FarmInput {
        FarmInput::parse("wheat", "2024-01-01", "Ludhiana, Punjab").unwrap()
    }

    #[tokio::test]
    async fn wheat_on_day_29_is_vegetative() {
        let weather = Arc::new(ScriptedWeather::new(vec![sunny_week(date(2024, 1, 30), 22.0)]));
        let resolver = Arc::new(StaticResolver::new(ludhiana()));
        let context = builder(weather, resolver).build(&wheat()).await.unwrap();

        assert_eq!(context.elapsed_days, 29);
        assert_eq!(context.crop_stage, CropStage::Vegetative);
        assert_eq!(context.precipitation, PrecipitationCategory::Sunny);
        assert_eq!(context.soil_type, SoilType::Loamy);
        assert_eq!(context.forecast_weather.len(), 7);
        assert_eq!(context.as_of, date(2024, 1, 30));
    }

    #[tokio::test]
    async fn future_sowing_date_fails_before_any_lookup() {
        let weather = Arc::new(ScriptedWeather::new(vec![sunny_week(date(2024, 1, 30), 22.0)]));
        let resolver = Arc::new(StaticResolver::new(ludhiana()));
        let input = FarmInput::parse("wheat", "2024-02-15", "Ludhiana").unwrap();

        let err = builder(weather.clone(), resolver.clone())
            .build(&input)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Validation(ValidationError::SowingInFuture { .. })
        ));
        assert_eq!(resolver.call_count(), 0);
        assert_eq!(weather.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_location_is_data_unavailable() {
        let weather = Arc::new(ScriptedWeather::new(vec![sunny_week(date(2024, 1, 30), 22.0)]));
        let resolver = Arc::new(StaticResolver::not_found());

        let err = builder(weather.clone(), resolver)
            .build(&wheat())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::DataUnavailable(WeatherError::LocationNotFound(_))
        ));
        assert_eq!(weather.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_forecast_is_data_unavailable() {
        let weather = Arc::new(ScriptedWeather::new(vec![report(vec![])]));
        let resolver = Arc::new(StaticResolver::new(ludhiana()));

        let err = builder(weather, resolver).build(&wheat()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::DataUnavailable(WeatherError::NoForecast { .. })
        ));
    }

    #[tokio::test]
    async fn failed_soil_lookup_defaults_to_loamy() {
        let weather = Arc::new(ScriptedWeather::new(vec![sunny_week(date(2024, 1, 30), 22.0)]));
        let resolver = Arc::new(StaticResolver::new(ludhiana()));
        let context = builder(weather, resolver)
            .with_soil(Arc::new(StaticSoil(None)))
            .build(&wheat())
            .await
            .unwrap();
        assert_eq!(context.soil_type, SoilType::Loamy);
    }

    #[tokio::test]
    async fn refresh_reuses_location_and_soil() {
        let weather = Arc::new(ScriptedWeather::new(vec![
            sunny_week(date(2024, 1, 30), 22.0),
            heavy_rain_week(date(2024, 1, 30), 22.0),
        ]));
        let resolver = Arc::new(StaticResolver::new(ludhiana()));
        let clock = Arc::new(FixedClock::new(date(2024, 1, 30)));
        let builder = ContextBuilder::new(resolver.clone(), weather.clone())
            .with_soil(Arc::new(StaticSoil(Some(SoilType::Clayey))))
            .with_clock(clock.clone());

        let first = builder.build(&wheat()).await.unwrap();
        clock.advance(31);
        let second = builder.refresh(&first).await.unwrap();

        assert_eq!(resolver.call_count(), 1);
        assert_eq!(weather.requested(), vec![ludhiana(), ludhiana()]);
        assert_eq!(second.soil_type, SoilType::Clayey);
        assert_eq!(second.precipitation, PrecipitationCategory::HeavyRain);
        assert_eq!(second.elapsed_days, 60);
        assert_eq!(second.crop_stage, CropStage::Flowering);
    }

    #[test]
    fn moisture_rises_with_rain_and_falls_with_heat() {
        let mut current = sunny_week(date(2024, 1, 30), 25.0).current;
        let dry = estimate_soil_moisture(&current, SoilType::Loamy);
        assert!((dry - 0.3).abs() < 1e-9);

        current.rain_last_3_days_mm = 20.0;
        let wet = estimate_soil_moisture(&current, SoilType::Loamy);
        assert!(wet > dry);

        current.avg_max_temp_last_3_days_c = 42.0;
        let hot = estimate_soil_moisture(&current, SoilType::Loamy);
        assert!(hot < wet);

        assert!(
            estimate_soil_moisture(&current, SoilType::Clayey)
                > estimate_soil_moisture(&current, SoilType::Sandy)
        );
    }

    #[test]
    fn moisture_is_clamped() {
        let mut current = sunny_week(date(2024, 1, 30), 25.0).current;
        current.rain_last_3_days_mm = 400.0;
        assert_eq!(estimate_soil_moisture(&current, SoilType::Clayey), 1.0);
        current.rain_last_3_days_mm = 0.0;
        current.avg_max_temp_last_3_days_c = 48.0;
        assert_eq!(estimate_soil_moisture(&current, SoilType::Sandy), 0.0);
    }
}
