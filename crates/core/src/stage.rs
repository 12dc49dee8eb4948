//! Crop growth stages and the crop-specific stage table.
//!
//! A stage is derived purely from the number of days elapsed since sowing.
//! Each crop maps elapsed days through its own [`StageBoundaries`]; crops
//! without an entry use the table's default boundaries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A discrete growth-phase label. Ordered from sowing to maturity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropStage {
    Sowing,
    Vegetative,
    Flowering,
    Maturity,
}

impl CropStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CropStage::Sowing => "sowing",
            CropStage::Vegetative => "vegetative",
            CropStage::Flowering => "flowering",
            CropStage::Maturity => "maturity",
        }
    }
}

impl fmt::Display for CropStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First elapsed day of each stage after sowing.
///
/// Days `0..vegetative_from` are [`CropStage::Sowing`], and so on; anything
/// at or past `maturity_from` is [`CropStage::Maturity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBoundaries {
    pub vegetative_from: u32,
    pub flowering_from: u32,
    pub maturity_from: u32,
}

impl StageBoundaries {
    pub const fn new(vegetative_from: u32, flowering_from: u32, maturity_from: u32) -> Self {
        Self {
            vegetative_from,
            flowering_from,
            maturity_from,
        }
    }

    /// Map an elapsed-day count to a stage.
    pub fn stage_for(&self, elapsed_days: u32) -> CropStage {
        if elapsed_days < self.vegetative_from {
            CropStage::Sowing
        } else if elapsed_days < self.flowering_from {
            CropStage::Vegetative
        } else if elapsed_days < self.maturity_from {
            CropStage::Flowering
        } else {
            CropStage::Maturity
        }
    }

    /// Boundaries must be strictly increasing and start after day zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.vegetative_from == 0 {
            return Err("vegetative_from must be greater than 0".into());
        }
        if !(self.vegetative_from < self.flowering_from
            && self.flowering_from < self.maturity_from)
        {
            return Err(format!(
                "stage boundaries must be strictly increasing, got {} / {} / {}",
                self.vegetative_from, self.flowering_from, self.maturity_from
            ));
        }
        Ok(())
    }
}

impl Default for StageBoundaries {
    fn default() -> Self {
        Self::new(15, 45, 75)
    }
}

/// Crop name → stage boundaries, with a fallback for unknown crops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTable {
    default: StageBoundaries,
    crops: HashMap<String, StageBoundaries>,
}

impl StageTable {
    /// A table containing only the default boundaries.
    pub fn new(default: StageBoundaries) -> Self {
        Self {
            default,
            crops: HashMap::new(),
        }
    }

    /// The built-in table for common field crops.
    pub fn builtin() -> Self {
        Self::new(StageBoundaries::default())
            .with_crop("wheat", StageBoundaries::new(15, 60, 100))
            .with_crop("rice", StageBoundaries::new(20, 65, 95))
            .with_crop("cotton", StageBoundaries::new(15, 60, 110))
            .with_crop("maize", StageBoundaries::new(12, 50, 85))
    }

    /// Add or replace the boundaries for a crop.
    pub fn with_crop(mut self, crop: &str, boundaries: StageBoundaries) -> Self {
        self.crops.insert(normalize(crop), boundaries);
        self
    }

    /// Boundaries for a crop, falling back to the default.
    pub fn boundaries_for(&self, crop: &str) -> StageBoundaries {
        self.crops
            .get(&normalize(crop))
            .copied()
            .unwrap_or(self.default)
    }

    /// Whether the crop has its own entry.
    pub fn knows(&self, crop: &str) -> bool {
        self.crops.contains_key(&normalize(crop))
    }

    /// Map a crop and elapsed-day count to a stage.
    pub fn stage_for(&self, crop: &str, elapsed_days: u32) -> CropStage {
        self.boundaries_for(crop).stage_for(elapsed_days)
    }
}

impl Default for StageTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize(crop: &str) -> String {
    crop.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheat_day_29_is_vegetative() {
        let table = StageTable::builtin();
        assert_eq!(table.stage_for("wheat", 29), CropStage::Vegetative);
        assert_eq!(table.stage_for("wheat", 29).to_string(), "vegetative");
    }

    #[test]
    fn default_boundaries_match_generic_schedule() {
        let table = StageTable::builtin();
        assert_eq!(table.stage_for("sorghum", 0), CropStage::Sowing);
        assert_eq!(table.stage_for("sorghum", 14), CropStage::Sowing);
        assert_eq!(table.stage_for("sorghum", 15), CropStage::Vegetative);
        assert_eq!(table.stage_for("sorghum", 45), CropStage::Flowering);
        assert_eq!(table.stage_for("sorghum", 75), CropStage::Maturity);
        assert_eq!(table.stage_for("sorghum", 400), CropStage::Maturity);
    }

    #[test]
    fn stage_is_monotonic_in_elapsed_days() {
        let table = StageTable::builtin();
        for crop in ["wheat", "rice", "cotton", "maize", "unknown"] {
            let mut previous = CropStage::Sowing;
            for day in 0..365 {
                let stage = table.stage_for(crop, day);
                assert!(stage >= previous, "{crop} regressed on day {day}");
                previous = stage;
            }
        }
    }

    #[test]
    fn crop_lookup_ignores_case_and_whitespace() {
        let table = StageTable::builtin();
        assert!(table.knows("  Wheat "));
        assert_eq!(
            table.boundaries_for("WHEAT"),
            table.boundaries_for("wheat")
        );
    }

    #[test]
    fn override_replaces_builtin_entry() {
        let table = StageTable::builtin().with_crop("wheat", StageBoundaries::new(5, 10, 20));
        assert_eq!(table.stage_for("wheat", 12), CropStage::Flowering);
    }

    #[test]
    fn validate_rejects_unordered_boundaries() {
        assert!(StageBoundaries::new(10, 10, 20).validate().is_err());
        assert!(StageBoundaries::new(0, 10, 20).validate().is_err());
        assert!(StageBoundaries::default().validate().is_ok());
    }
}
