//! Configuration loading, validation, and management for FarmLoop.
//!
//! Loads configuration from `~/.farmloop/config.toml` with environment
//! variable overrides. Validates all settings at startup: every threshold the
//! advisory loop relies on (iteration cap, time budget, change tolerance,
//! forecast cut-offs, stage tables) lives here rather than in code.

use farmloop_core::stage::{StageBoundaries, StageTable};
use farmloop_core::weather::WeatherThresholds;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.farmloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Per-request timeout for LLM calls; local models on CPU are slow
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Advisory loop bounds and retry policy
    #[serde(default, rename = "loop")]
    pub advisory_loop: LoopConfig,

    /// How far conditions may drift before a plan is regenerated
    #[serde(default)]
    pub tolerance: ToleranceConfig,

    /// Geocoding and forecast endpoints plus forecast classification
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Soil lookup
    #[serde(default)]
    pub soil: SoilConfig,

    /// Per-crop stage boundary overrides; the key `default` replaces the
    /// fallback used for crops without an entry
    #[serde(default)]
    pub stages: HashMap<String, StageBoundaries>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "mistral".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_request_timeout_secs() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("providers", &self.providers)
            .field("advisory_loop", &self.advisory_loop)
            .field("tolerance", &self.tolerance)
            .field("weather", &self.weather)
            .field("soil", &self.soil)
            .field("stages", &self.stages)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Maximum number of plans generated in one session
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Wall-clock budget for the whole session
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,

    /// Pause between issuing a plan and re-checking the weather
    #[serde(default)]
    pub recheck_interval_secs: u64,

    /// Extra attempts after a failed generation
    #[serde(default = "default_generation_retries")]
    pub generation_retries: u32,

    /// Replies shorter than this are treated as unusable
    #[serde(default = "default_min_response_chars")]
    pub min_response_chars: usize,
}

fn default_max_iterations() -> u32 {
    3
}
fn default_time_budget_secs() -> u64 {
    300
}
fn default_generation_retries() -> u32 {
    1
}
fn default_min_response_chars() -> usize {
    50
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            time_budget_secs: default_time_budget_secs(),
            recheck_interval_secs: 0,
            generation_retries: default_generation_retries(),
            min_response_chars: default_min_response_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// Category steps (sunny → light → moderate → heavy) tolerated without replanning
    #[serde(default)]
    pub precipitation_steps: u8,

    /// Temperature bands tolerated without replanning
    #[serde(default)]
    pub temperature_bands: u32,

    /// Replan when the crop moves into a new stage
    #[serde(default = "default_true")]
    pub stage_transitions: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            precipitation_steps: 0,
            temperature_bands: 0,
            stage_transitions: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,

    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,

    /// Sent to the geocoder, which rejects anonymous clients
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,

    /// Look-back window for recent rain and heat
    #[serde(default = "default_past_days")]
    pub past_days: u32,

    #[serde(default = "default_forecast_days")]
    pub forecast_days: u32,

    #[serde(default = "default_heavy_rain_mm")]
    pub heavy_rain_mm: f64,

    #[serde(default = "default_rain_expected_mm")]
    pub rain_expected_mm: f64,

    #[serde(default = "default_dry_spell_mm")]
    pub dry_spell_mm: f64,

    #[serde(default = "default_temperature_band_c")]
    pub temperature_band_c: f64,
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org".into()
}
fn default_forecast_url() -> String {
    "https://api.open-meteo.com".into()
}
fn default_user_agent() -> String {
    concat!("farmloop/", env!("CARGO_PKG_VERSION")).into()
}
fn default_http_timeout_secs() -> u64 {
    10
}
fn default_past_days() -> u32 {
    3
}
fn default_forecast_days() -> u32 {
    7
}
fn default_heavy_rain_mm() -> f64 {
    WeatherThresholds::default().heavy_rain_mm
}
fn default_rain_expected_mm() -> f64 {
    WeatherThresholds::default().rain_expected_mm
}
fn default_dry_spell_mm() -> f64 {
    WeatherThresholds::default().dry_spell_mm
}
fn default_temperature_band_c() -> f64 {
    WeatherThresholds::default().temperature_band_c
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            geocoder_url: default_geocoder_url(),
            forecast_url: default_forecast_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_http_timeout_secs(),
            past_days: default_past_days(),
            forecast_days: default_forecast_days(),
            heavy_rain_mm: default_heavy_rain_mm(),
            rain_expected_mm: default_rain_expected_mm(),
            dry_spell_mm: default_dry_spell_mm(),
            temperature_band_c: default_temperature_band_c(),
        }
    }
}

impl WeatherConfig {
    /// The forecast classification cut-offs.
    pub fn thresholds(&self) -> WeatherThresholds {
        WeatherThresholds {
            heavy_rain_mm: self.heavy_rain_mm,
            rain_expected_mm: self.rain_expected_mm,
            dry_spell_mm: self.dry_spell_mm,
            temperature_band_c: self.temperature_band_c,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoilConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_soil_url")]
    pub url: String,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_soil_url() -> String {
    "https://rest.isric.org".into()
}

impl Default for SoilConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_soil_url(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.farmloop/config.toml).
    ///
    /// Also checks environment variables:
    /// - `FARMLOOP_API_KEY` (highest priority), `GROQ_API_KEY`, `OPENAI_API_KEY`
    /// - `FARMLOOP_PROVIDER`, `FARMLOOP_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("FARMLOOP_API_KEY")
                .or_else(|| lookup("GROQ_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("FARMLOOP_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("FARMLOOP_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".farmloop")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be > 0".into(),
            ));
        }

        if self.advisory_loop.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "loop.max_iterations must be at least 1".into(),
            ));
        }

        if self.advisory_loop.time_budget_secs == 0 {
            return Err(ConfigError::ValidationError(
                "loop.time_budget_secs must be > 0".into(),
            ));
        }

        if !(2..=16).contains(&self.weather.forecast_days) {
            return Err(ConfigError::ValidationError(
                "weather.forecast_days must be between 2 and 16".into(),
            ));
        }

        if !(1..=92).contains(&self.weather.past_days) {
            return Err(ConfigError::ValidationError(
                "weather.past_days must be between 1 and 92".into(),
            ));
        }

        self.weather
            .thresholds()
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("weather: {e}")))?;

        for (crop, boundaries) in &self.stages {
            boundaries
                .validate()
                .map_err(|e| ConfigError::ValidationError(format!("stages.{crop}: {e}")))?;
        }

        Ok(())
    }

    /// The built-in stage table with configured overrides applied.
    pub fn stage_table(&self) -> StageTable {
        let mut table = match self.stages.get("default") {
            Some(default) => {
                let mut t = StageTable::new(*default);
                for (crop, b) in builtin_crops() {
                    t = t.with_crop(crop, b);
                }
                t
            }
            None => StageTable::builtin(),
        };
        for (crop, boundaries) in &self.stages {
            if crop != "default" {
                table = table.with_crop(crop, *boundaries);
            }
        }
        table
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self.providers.values().any(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn builtin_crops() -> Vec<(&'static str, StageBoundaries)> {
    let table = StageTable::builtin();
    ["wheat", "rice", "cotton", "maize"]
        .into_iter()
        .map(|crop| (crop, table.boundaries_for(crop)))
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            providers: HashMap::new(),
            advisory_loop: LoopConfig::default(),
            tolerance: ToleranceConfig::default(),
            weather: WeatherConfig::default(),
            soil: SoilConfig::default(),
            stages: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmloop_core::stage::CropStage;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "ollama");
        assert_eq!(config.advisory_loop.max_iterations, 3);
        assert_eq!(config.advisory_loop.generation_retries, 1);
        assert!(config.tolerance.stage_transitions);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.weather.forecast_days, config.weather.forecast_days);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iteration_cap_rejected() {
        let mut config = AppConfig::default();
        config.advisory_loop.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn request_timeout_defaults_and_must_be_nonzero() {
        let mut config: AppConfig = toml::from_str("default_provider = \"ollama\"").unwrap();
        assert_eq!(config.request_timeout_secs, 120);
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_model, "mistral");
    }

    #[test]
    fn load_from_file_with_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
default_provider = "groq"
default_model = "llama-3.3-70b-versatile"

[loop]
max_iterations = 5
time_budget_secs = 60

[tolerance]
precipitation_steps = 1

[weather]
heavy_rain_mm = 30.0

[stages.wheat]
vegetative_from = 10
flowering_from = 50
maturity_from = 90
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_provider, "groq");
        assert_eq!(config.advisory_loop.max_iterations, 5);
        assert_eq!(config.advisory_loop.generation_retries, 1);
        assert_eq!(config.tolerance.precipitation_steps, 1);
        assert!((config.weather.thresholds().heavy_rain_mm - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.stage_table().stage_for("wheat", 12), CropStage::Vegetative);
    }

    #[test]
    fn unordered_stage_override_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[stages.rice]\nvegetative_from = 30\nflowering_from = 20\nmaturity_from = 90\n"
        )
        .unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("stages.rice"));
    }

    #[test]
    fn default_stage_override_keeps_builtin_crops() {
        let mut config = AppConfig::default();
        config
            .stages
            .insert("default".into(), StageBoundaries::new(5, 10, 20));
        let table = config.stage_table();
        assert_eq!(table.stage_for("millet", 12), CropStage::Flowering);
        assert_eq!(table.stage_for("wheat", 29), CropStage::Vegetative);
    }

    #[test]
    fn env_overrides_fill_missing_key() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            "GROQ_API_KEY" => Some("gsk-test".into()),
            "FARMLOOP_MODEL" => Some("llama3".into()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("gsk-test"));
        assert_eq!(config.default_model, "llama3");
        assert_eq!(config.default_provider, "ollama");
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("mistral"));
        assert!(toml_str.contains("[loop]"));
    }
}
