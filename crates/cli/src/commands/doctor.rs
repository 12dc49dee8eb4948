//! `farmloop doctor`: Diagnose system health.

use farmloop_agent::GeneratorSettings;
use farmloop_config::AppConfig;
use farmloop_core::error::ProviderError;
use farmloop_core::provider::Provider;
use farmloop_core::weather::{LocationResolver, WeatherSource};
use farmloop_providers::router;
use farmloop_weather::{NominatimResolver, OpenMeteoSource};

/// A well-known place for checking the geocoder and forecast services.
const SAMPLE_LOCATION: &str = "New Delhi, India";

/// Whether the backend serves the configured model.
#[derive(Debug, PartialEq, Eq)]
enum ModelStatus {
    Listed,
    Missing { available: usize },
    /// The backend does not list models
    Unknown,
}

/// Ollama lists `mistral:latest` for a configured `mistral`.
async fn model_status(provider: &dyn Provider, model: &str) -> Result<ModelStatus, ProviderError> {
    let models = provider.list_models().await?;
    tracing::debug!(provider = provider.name(), count = models.len(), "Listed models");
    if models.is_empty() {
        return Ok(ModelStatus::Unknown);
    }
    let listed = models
        .iter()
        .any(|m| m == model || m.split_once(':').is_some_and(|(base, _)| base == model));
    Ok(if listed {
        ModelStatus::Listed
    } else {
        ModelStatus::Missing {
            available: models.len(),
        }
    })
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 FarmLoop Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file — run `farmloop onboard` (using defaults)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config file invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. Fix the config and re-run doctor.");
            return Ok(());
        }
    };

    // Provider
    let provider_name = &config.default_provider;
    if router::is_local(provider_name) {
        println!("  ✅ Local provider '{provider_name}' needs no API key");
    } else if config.has_api_key() {
        println!("  ✅ API key configured for '{provider_name}'");
    } else {
        println!("  ❌ No API key for '{provider_name}' — set FARMLOOP_API_KEY or api_key");
        issues += 1;
    }

    let model = GeneratorSettings::from_config(&config).model;
    match router::build_from_config(&config).default() {
        Some(provider) => match provider.health_check().await {
            Ok(true) => {
                println!("  ✅ Provider '{provider_name}' reachable");
                match model_status(provider.as_ref(), &model).await {
                    Ok(ModelStatus::Listed) => println!("  ✅ Model '{model}' available"),
                    Ok(ModelStatus::Missing { available }) => {
                        println!("  ❌ Model '{model}' not among the {available} model(s) served");
                        issues += 1;
                    }
                    Ok(ModelStatus::Unknown) => {
                        println!("  ⚠️  Provider did not list its models; '{model}' unchecked")
                    }
                    Err(e) => println!("  ⚠️  Could not list models: {e}"),
                }
            }
            Ok(false) => {
                println!("  ❌ Provider '{provider_name}' answered but is not healthy");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider '{provider_name}' unreachable: {e}");
                issues += 1;
            }
        },
        None => {
            println!("  ❌ No default provider configured");
            issues += 1;
        }
    }

    // Weather services
    let resolver = NominatimResolver::from_config(&config.weather);
    match resolver.resolve(SAMPLE_LOCATION).await {
        Ok(coordinates) => {
            println!("  ✅ Geocoder reachable ({})", config.weather.geocoder_url);
            let weather = OpenMeteoSource::from_config(&config.weather);
            match weather.fetch(&coordinates).await {
                Ok(report) => println!(
                    "  ✅ Forecast reachable ({} days from {})",
                    report.forecast.len(),
                    config.weather.forecast_url
                ),
                Err(e) => {
                    println!("  ❌ Forecast unavailable: {e}");
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  ❌ Geocoder unavailable: {e}");
            issues += 1;
        }
    }

    if !config.soil.enabled {
        println!("  ⚠️  Soil lookup disabled; every farm is treated as loamy");
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmloop_providers::OpenAiCompatProvider;
    use std::time::Duration;

    async fn status_for(models_body: &str, model: &str) -> ModelStatus {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/models")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(models_body)
            .create_async()
            .await;
        let provider =
            OpenAiCompatProvider::new("ollama", server.url(), "ollama", Duration::from_secs(5));
        model_status(&provider, model).await.unwrap()
    }

    #[tokio::test]
    async fn tagged_model_matches_bare_name() {
        let body = r#"{"data":[{"id":"llama3.1:8b"},{"id":"mistral:latest"}]}"#;
        assert_eq!(status_for(body, "mistral").await, ModelStatus::Listed);
        assert_eq!(status_for(body, "mistral:latest").await, ModelStatus::Listed);
    }

    #[tokio::test]
    async fn unlisted_model_is_missing() {
        let body = r#"{"data":[{"id":"llama3.1:8b"}]}"#;
        assert_eq!(
            status_for(body, "mistral").await,
            ModelStatus::Missing { available: 1 }
        );
    }

    #[tokio::test]
    async fn empty_listing_is_unknown() {
        assert_eq!(status_for(r#"{"data":[]}"#, "mistral").await, ModelStatus::Unknown);
    }
}
