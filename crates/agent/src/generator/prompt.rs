//! Prompt construction for plan generation.

use farmloop_core::farm::FarmContext;
use farmloop_core::message::Message;
use farmloop_core::plan::AdvisoryPlan;
use farmloop_core::stage::CropStage;
use std::fmt::Write;

/// Why a plan is being rewritten.
#[derive(Debug, Clone, Copy)]
pub struct Replan<'a> {
    pub previous: &'a AdvisoryPlan,
    pub reason: &'a str,
}

const SYSTEM_PROMPT: &str = "You are a practical agronomy advisor for smallholder farmers. \
You write one-week field plans that a farmer can follow without technical training.

Reply with a single JSON object and nothing else:
{\"summary\": \"<one or two sentences>\", \
\"actions\": [{\"day\": 1, \"action\": \"<what to do>\", \"rationale\": \"<short reason>\"}, ...]}

The actions array must contain exactly 7 entries, days 1 to 7 in order.";

pub fn system_message() -> Message {
    Message::system(SYSTEM_PROMPT)
}

/// The user turn: the farm briefing, the rules, and on a replan the
/// superseded plan with the reason it no longer holds.
pub fn briefing(context: &FarmContext, replan: Option<Replan<'_>>) -> Message {
    let mut out = String::new();
    let _ = writeln!(out, "Create a 7-day farming action plan.");
    let _ = writeln!(out);
    let _ = writeln!(out, "Crop: {}", context.crop);
    let _ = writeln!(
        out,
        "Sown: {} ({} days ago)",
        context.sowing_date, context.elapsed_days
    );
    let _ = writeln!(out, "Stage: {}", context.crop_stage);
    let _ = writeln!(out, "Soil: {}", context.soil_type);
    let place = context
        .coordinates
        .display_name
        .as_deref()
        .unwrap_or(&context.location);
    let _ = writeln!(out, "Location: {place} ({})", context.coordinates);
    let _ = writeln!(
        out,
        "Estimated soil moisture: {:.2} (0 dry, 1 saturated)",
        context.derived_soil_moisture
    );
    let _ = writeln!(out);

    let current = &context.current_weather;
    let _ = writeln!(out, "Current weather:");
    let _ = write!(
        out,
        "- Temperature {:.1} °C, precipitation {:.1} mm",
        current.temperature_c, current.precipitation_mm
    );
    if let Some(humidity) = current.relative_humidity {
        let _ = write!(out, ", humidity {humidity:.0}%");
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "- Last 3 days: {:.1} mm rain, average max {:.1} °C",
        current.rain_last_3_days_mm, current.avg_max_temp_last_3_days_c
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Forecast:");
    for day in &context.forecast_weather {
        let _ = writeln!(
            out,
            "- {}: {:.1} mm rain, max {:.1} °C",
            day.date, day.rain_mm, day.max_temp_c
        );
    }
    let _ = writeln!(
        out,
        "Outlook: {}, rain next 48h {:.1} mm, temperatures {}",
        context.precipitation,
        context.rain_next_48h_mm(),
        context.temperature_band
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Rules:");
    let _ = writeln!(out, "- One primary action per day");
    if context.precipitation.expects_rain() {
        let _ = writeln!(out, "- Rain is expected: skip irrigation");
    } else {
        let _ = writeln!(out, "- Skip irrigation on days rain is expected");
    }
    if context.crop_stage == CropStage::Maturity {
        let _ = writeln!(out, "- The crop is near maturity: do not apply fertilizer");
    } else {
        let _ = writeln!(out, "- Avoid fertilizer near maturity");
    }
    let _ = writeln!(out, "- Include rest days if no action is needed");
    let _ = writeln!(out, "- Keep the language simple and practical");

    if let Some(replan) = replan {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Conditions changed since the previous plan: {}.",
            replan.reason
        );
        if !replan.previous.summary.is_empty() {
            let _ = writeln!(out, "Previous plan summary: {}", replan.previous.summary);
        }
        let _ = writeln!(out, "Rewrite the whole week for the new conditions.");
    }

    Message::user(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use farmloop_core::farm::{Coordinates, SoilType};
    use farmloop_core::plan::PlanAssumptions;
    use farmloop_core::weather::{CurrentWeather, DailyForecast, WeatherThresholds};

    fn context(rain: f64, stage: CropStage) -> FarmContext {
        let start = NaiveDate::from_ymd_opt(2024, 1, 30).unwrap();
        let forecast: Vec<DailyForecast> = (0..7)
            .map(|i| DailyForecast {
                date: start + chrono::Days::new(i),
                rain_mm: if i == 0 { rain } else { 0.0 },
                max_temp_c: 24.0,
            })
            .collect();
        let t = WeatherThresholds::default();
        FarmContext {
            crop: "wheat".into(),
            sowing_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            location: "Ludhiana".into(),
            coordinates: Coordinates::new(30.9, 75.85),
            soil_type: SoilType::Loamy,
            current_weather: CurrentWeather {
                temperature_c: 21.0,
                precipitation_mm: 0.0,
                relative_humidity: Some(60.0),
                rain_last_3_days_mm: 0.0,
                avg_max_temp_last_3_days_c: 22.0,
            },
            precipitation: t.precipitation_category(&forecast),
            temperature_band: t.temperature_band(&forecast),
            forecast_weather: forecast,
            derived_soil_moisture: 0.3,
            crop_stage: stage,
            elapsed_days: 29,
            as_of: start,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn briefing_lists_farm_facts() {
        let text = briefing(&context(0.0, CropStage::Vegetative), None).content;
        assert!(text.contains("Crop: wheat"));
        assert!(text.contains("Stage: vegetative"));
        assert!(text.contains("Soil: loamy soil"));
        assert!(text.contains("2024-02-05"));
        assert!(text.contains("Outlook: sunny"));
        assert!(!text.contains("Conditions changed"));
    }

    #[test]
    fn rain_and_maturity_tighten_rules() {
        let text = briefing(&context(30.0, CropStage::Maturity), None).content;
        assert!(text.contains("Rain is expected: skip irrigation"));
        assert!(text.contains("do not apply fertilizer"));
    }

    #[test]
    fn replan_carries_reason_and_previous_summary() {
        let ctx = context(30.0, CropStage::Vegetative);
        let previous = AdvisoryPlan::new(
            1,
            "Irrigate lightly mid-week.",
            PlanAssumptions::from_context(&context(0.0, CropStage::Vegetative)),
            vec![],
            "",
            "mock",
        );
        let text = briefing(
            &ctx,
            Some(Replan {
                previous: &previous,
                reason: "precipitation sunny → heavy rain",
            }),
        )
        .content;
        assert!(text.contains("precipitation sunny → heavy rain"));
        assert!(text.contains("Previous plan summary: Irrigate lightly mid-week."));
    }

    #[test]
    fn system_prompt_demands_seven_days() {
        assert!(system_message().content.contains("exactly 7 entries"));
    }
}
