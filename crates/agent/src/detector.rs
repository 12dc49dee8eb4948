//! Change detection: has the farm drifted away from what the current plan
//! assumed?
//!
//! Pure and deterministic. Three fields are tracked:
//!
//! - **precipitation**: category steps (sunny → light → moderate → heavy)
//! - **temperature**: band steps
//! - **stage**: any transition, when enabled
//!
//! A field changes when its distance exceeds the tolerance. The reason lists
//! every field that changed.

use farmloop_config::ToleranceConfig;
use farmloop_core::farm::FarmContext;
use farmloop_core::plan::{ChangeSignal, PlanAssumptions};
use serde::{Deserialize, Serialize};

/// How much drift is tolerated before a plan is regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTolerance {
    pub precipitation_steps: u8,
    pub temperature_bands: u32,
    pub stage_transitions: bool,
}

impl Default for ChangeTolerance {
    fn default() -> Self {
        Self {
            precipitation_steps: 0,
            temperature_bands: 0,
            stage_transitions: true,
        }
    }
}

impl From<&ToleranceConfig> for ChangeTolerance {
    fn from(config: &ToleranceConfig) -> Self {
        Self {
            precipitation_steps: config.precipitation_steps,
            temperature_bands: config.temperature_bands,
            stage_transitions: config.stage_transitions,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    tolerance: ChangeTolerance,
}

impl ChangeDetector {
    pub fn new(tolerance: ChangeTolerance) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> ChangeTolerance {
        self.tolerance
    }

    /// Compare a plan's assumptions with a fresh context.
    pub fn evaluate(&self, assumptions: &PlanAssumptions, current: &FarmContext) -> ChangeSignal {
        let mut drift = Vec::new();

        let steps = assumptions
            .precipitation
            .ordinal()
            .abs_diff(current.precipitation.ordinal());
        if steps > self.tolerance.precipitation_steps {
            drift.push(format!(
                "precipitation {} → {}",
                assumptions.precipitation, current.precipitation
            ));
        }

        let bands = assumptions
            .temperature_band
            .distance(&current.temperature_band);
        if bands > self.tolerance.temperature_bands {
            drift.push(format!(
                "temperature {} → {}",
                assumptions.temperature_band, current.temperature_band
            ));
        }

        if self.tolerance.stage_transitions && assumptions.crop_stage != current.crop_stage {
            drift.push(format!(
                "stage {} → {}",
                assumptions.crop_stage, current.crop_stage
            ));
        }

        if drift.is_empty() {
            ChangeSignal::unchanged()
        } else {
            ChangeSignal::changed(drift.join("; "))
        }
    }
}
