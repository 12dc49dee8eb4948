//! Context building: farmer input plus location, soil and weather lookups,
//! reduced to one immutable [`FarmContext`](farmloop_core::FarmContext)
//! snapshot per loop iteration.
//!
//! | Field | Source | Refreshed each pass |
//! |-------|--------|---------------------|
//! | crop, sowing date, location | farmer | no |
//! | coordinates | location resolver | no |
//! | soil type | soil source (optional) | no |
//! | current + forecast weather | weather source | yes |
//! | stage, moisture, rain category, temperature band | derived | yes |

pub mod builder;
pub mod clock;

pub use builder::{ContextBuilder, estimate_soil_moisture};
pub use clock::{Clock, FixedClock, SystemClock};
