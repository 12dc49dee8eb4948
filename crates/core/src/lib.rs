//! # FarmLoop Core
//!
//! Domain types, collaborator traits, and error definitions for the FarmLoop
//! advisory agent. This crate does **no I/O of its own**: it defines the
//! model that the weather, provider, and agent crates implement against.
//!
//! ## Layout
//!
//! - [`farm`]: farmer input, coordinates, soil, and the per-iteration
//!   [`FarmContext`] snapshot
//! - [`weather`]: weather records, forecast classification, and the
//!   location/weather/soil collaborator traits
//! - [`stage`]: crop growth stages and the crop-specific stage table
//! - [`plan`]: advisory plans, their assumptions, and change signals
//! - [`provider`]: the LLM backend abstraction
//! - [`event`]: domain events published by the advisory loop

pub mod error;
pub mod event;
pub mod farm;
pub mod message;
pub mod plan;
pub mod provider;
pub mod stage;
pub mod weather;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use farm::{Coordinates, FarmContext, FarmInput, SessionId, SoilType};
pub use message::{Message, Role};
pub use plan::{AdvisoryPlan, ChangeSignal, PLAN_DAYS, PlanAction, PlanAssumptions};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use stage::{CropStage, StageBoundaries, StageTable};
pub use weather::{
    CurrentWeather, DailyForecast, LocationResolver, PrecipitationCategory, SoilSource,
    TemperatureBand, WeatherReport, WeatherSource, WeatherThresholds,
};
