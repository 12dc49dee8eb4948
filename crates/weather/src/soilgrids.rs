//! ISRIC SoilGrids topsoil classifier.

use crate::{check_status, http_client, network_error, parse_error};
use async_trait::async_trait;
use farmloop_config::{SoilConfig, WeatherConfig};
use farmloop_core::error::WeatherError;
use farmloop_core::farm::{Coordinates, SoilType};
use farmloop_core::weather::SoilSource;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "soilgrids";

/// Topsoil depth intervals averaged together (0-30 cm).
const DEPTHS: [&str; 3] = ["0-5cm", "5-15cm", "15-30cm"];

/// Classifies topsoil from clay, sand, and organic carbon content.
pub struct SoilGridsSource {
    base_url: String,
    client: reqwest::Client,
}

impl SoilGridsSource {
    pub fn new(base_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(user_agent, timeout),
        }
    }

    pub fn from_config(soil: &SoilConfig, weather: &WeatherConfig) -> Self {
        Self::new(
            &soil.url,
            &weather.user_agent,
            Duration::from_secs(soil.timeout_secs),
        )
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Properties {
    layers: Vec<Layer>,
}

#[derive(Debug, Deserialize)]
struct Layer {
    name: String,
    unit_measure: Option<UnitMeasure>,
    depths: Vec<Depth>,
}

#[derive(Debug, Deserialize)]
struct UnitMeasure {
    d_factor: f64,
}

#[derive(Debug, Deserialize)]
struct Depth {
    values: DepthValues,
}

#[derive(Debug, Deserialize)]
struct DepthValues {
    mean: Option<f64>,
}

impl Layer {
    /// Mean over the reported depths, in conventional units (% or g/kg).
    fn mean(&self) -> Option<f64> {
        let factor = self
            .unit_measure
            .as_ref()
            .map(|u| u.d_factor)
            .filter(|f| *f > 0.0)
            .unwrap_or(1.0);
        let values: Vec<f64> = self.depths.iter().filter_map(|d| d.values.mean).collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64 / factor)
    }
}

#[async_trait]
impl SoilSource for SoilGridsSource {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn soil_type(&self, coordinates: &Coordinates) -> Result<SoilType, WeatherError> {
        let mut query: Vec<(&str, String)> = vec![
            ("lat", coordinates.latitude.to_string()),
            ("lon", coordinates.longitude.to_string()),
            ("value", "mean".into()),
        ];
        for property in ["clay", "sand", "soc"] {
            query.push(("property", property.into()));
        }
        for depth in DEPTHS {
            query.push(("depth", depth.into()));
        }

        let response = self
            .client
            .get(format!("{}/soilgrids/v2.0/properties/query", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| network_error(SERVICE, e))?;

        let body: QueryResponse = check_status(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| parse_error(SERVICE, e))?;

        let find = |name: &str| {
            body.properties
                .layers
                .iter()
                .find(|l| l.name == name)
                .and_then(Layer::mean)
        };

        let (Some(clay), Some(sand)) = (find("clay"), find("sand")) else {
            return Err(parse_error(SERVICE, "no clay/sand values at this location"));
        };
        let soc = find("soc");

        let soil = SoilType::classify(clay, sand, soc);
        debug!(clay, sand, ?soc, %soil, "Classified topsoil");
        Ok(soil)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn layer(name: &str, means: &[Option<f64>]) -> serde_json::Value {
        let depths: Vec<_> = means
            .iter()
            .zip(DEPTHS)
            .map(|(m, label)| serde_json::json!({ "label": label, "values": { "mean": m } }))
            .collect();
        serde_json::json!({
            "name": name,
            "unit_measure": { "d_factor": 10 },
            "depths": depths
        })
    }

    async fn classify(layers: Vec<serde_json::Value>) -> Result<SoilType, WeatherError> {
        let mut server = mockito::Server::new_async().await;
        // Repeated keys: UrlEncoded would only see the last value of each
        let mock = server
            .mock("GET", "/soilgrids/v2.0/properties/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::Regex("property=clay".into()),
                Matcher::Regex("property=sand".into()),
                Matcher::Regex("property=soc".into()),
                Matcher::Regex("depth=0-5cm".into()),
                Matcher::Regex("depth=15-30cm".into()),
                Matcher::Regex("value=mean".into()),
            ]))
            .with_status(200)
            .with_body(serde_json::json!({ "properties": { "layers": layers } }).to_string())
            .create_async()
            .await;

        let result = SoilGridsSource::new(server.url(), "farmloop-test", Duration::from_secs(5))
            .soil_type(&Coordinates::new(20.74, 78.60))
            .await;
        mock.assert_async().await;
        result
    }

    #[tokio::test]
    async fn black_cotton_soil_is_clayey() {
        let soil = classify(vec![
            layer("clay", &[Some(480.0), Some(500.0), Some(520.0)]),
            layer("sand", &[Some(200.0), Some(190.0), Some(180.0)]),
            layer("soc", &[Some(90.0), Some(80.0), Some(70.0)]),
        ])
        .await
        .unwrap();
        assert_eq!(soil, SoilType::Clayey);
    }

    #[tokio::test]
    async fn organic_loam_is_loamy_fertile() {
        let soil = classify(vec![
            layer("clay", &[Some(250.0), Some(250.0), Some(250.0)]),
            layer("sand", &[Some(400.0), Some(400.0), Some(400.0)]),
            layer("soc", &[Some(200.0), Some(180.0), Some(160.0)]),
        ])
        .await
        .unwrap();
        assert_eq!(soil, SoilType::LoamyFertile);
    }

    #[tokio::test]
    async fn missing_values_are_a_parse_error() {
        let err = classify(vec![layer("clay", &[None, None, None])])
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::Parse { .. }));
    }
}
