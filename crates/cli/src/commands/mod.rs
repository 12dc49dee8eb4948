pub mod advise;
pub mod doctor;
pub mod onboard;
pub mod stage;

use chrono::NaiveDate;
use farmloop_core::farm::parse_date;

/// Parse an optional `--today` override.
pub(crate) fn today_override(
    value: Option<&str>,
) -> Result<Option<NaiveDate>, Box<dyn std::error::Error>> {
    Ok(value.map(parse_date).transpose()?)
}
