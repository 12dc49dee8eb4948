//! Advisory plans, the assumptions they were written under, and the change
//! signal produced when conditions drift away from those assumptions.

use crate::farm::FarmContext;
use crate::stage::CropStage;
use crate::weather::{PrecipitationCategory, TemperatureBand};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of daily entries in every plan.
pub const PLAN_DAYS: usize = 7;

/// The subset of a [`FarmContext`] a plan depends on.
///
/// Copied from the structured context the plan was generated from, so the
/// change detector always compares like with like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAssumptions {
    pub crop_stage: CropStage,
    pub precipitation: PrecipitationCategory,
    pub temperature_band: TemperatureBand,
    pub mean_max_temp_c: f64,
    pub rain_next_48h_mm: f64,
    pub soil_moisture: f64,
}

impl PlanAssumptions {
    pub fn from_context(context: &FarmContext) -> Self {
        Self {
            crop_stage: context.crop_stage,
            precipitation: context.precipitation,
            temperature_band: context.temperature_band,
            mean_max_temp_c: context.mean_max_temp_c(),
            rain_next_48h_mm: context.rain_next_48h_mm(),
            soil_moisture: context.derived_soil_moisture,
        }
    }
}

/// One day of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanAction {
    /// 1-based day number
    pub day: u8,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// A 7-day advisory plan. Superseded, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryPlan {
    pub id: String,
    pub generated_at: DateTime<Utc>,

    /// Loop iteration that produced this plan (1-based)
    pub iteration: u32,

    pub summary: String,
    pub assumptions: PlanAssumptions,

    /// Exactly [`PLAN_DAYS`] entries, day 1 first
    pub actions: Vec<PlanAction>,

    /// The model's reply as received
    pub raw_text: String,

    /// Which model wrote it
    pub model: String,
}

impl AdvisoryPlan {
    pub fn new(
        iteration: u32,
        summary: impl Into<String>,
        assumptions: PlanAssumptions,
        actions: Vec<PlanAction>,
        raw_text: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            iteration,
            summary: summary.into(),
            assumptions,
            actions,
            raw_text: raw_text.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for AdvisoryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.summary.is_empty() {
            writeln!(f, "{}", self.summary)?;
            writeln!(f)?;
        }
        for action in &self.actions {
            write!(f, "Day {}: {}", action.day, action.action)?;
            if let Some(why) = &action.rationale {
                write!(f, " ({why})")?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;
        write!(
            f,
            "Assumes: {} stage, {}, {}, soil moisture {:.2}",
            self.assumptions.crop_stage,
            self.assumptions.precipitation,
            self.assumptions.temperature_band,
            self.assumptions.soil_moisture
        )
    }
}

/// Whether conditions have drifted from a plan's assumptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSignal {
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChangeSignal {
    pub fn unchanged() -> Self {
        Self {
            changed: false,
            reason: None,
        }
    }

    pub fn changed(reason: impl Into<String>) -> Self {
        Self {
            changed: true,
            reason: Some(reason.into()),
        }
    }
}
