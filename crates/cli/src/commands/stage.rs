//! `farmloop stage`: Days since sowing and the growth stage, no network.

use farmloop_agent::{Clock, SystemClock};
use farmloop_config::AppConfig;
use farmloop_core::error::ValidationError;
use farmloop_core::farm::{FarmInput, parse_date};

pub fn run(
    crop: &str,
    sowing_date: &str,
    today: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let today = super::today_override(today)?.unwrap_or_else(|| SystemClock.today());

    let input = stage_input(crop, sowing_date)?;
    let elapsed = input.elapsed_days(today)?;
    let table = config.stage_table();
    let stage = table.stage_for(&input.crop, elapsed);

    println!("🌱 {} sown {}", input.crop, input.sowing_date);
    println!("   Day {elapsed} as of {today}: {stage} stage");
    if !table.knows(&input.crop) {
        println!("   (no stage table for {}, using the default boundaries)", input.crop);
    }

    Ok(())
}

/// Same rules as [`FarmInput::parse`], minus the location this command never uses.
fn stage_input(crop: &str, sowing_date: &str) -> Result<FarmInput, ValidationError> {
    let crop = crop.trim();
    if crop.is_empty() {
        return Err(ValidationError::EmptyField("crop"));
    }
    Ok(FarmInput {
        crop: crop.to_string(),
        sowing_date: parse_date(sowing_date)?,
        location: String::new(),
    })
}
