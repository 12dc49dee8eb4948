//! The FarmLoop advisory agent.
//!
//! One session runs a small cycle:
//!
//! 1. **Collect** farmer input, resolve the location, fetch soil and weather
//!    into a [`FarmContext`](farmloop_core::FarmContext)
//! 2. **Advise**: ask the LLM for a 7-day plan, tagged with the context
//!    fields it was written against
//! 3. **Evaluate**: re-fetch the weather and compare it to those fields
//! 4. **If changed**: loop back to step 2 with the fresh context
//! 5. **If unchanged**: return the current plan
//!
//! The cycle is bounded by an iteration cap and a wall-clock budget.

pub mod context;
pub mod detector;
pub mod generator;
pub mod loop_runner;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{Clock, ContextBuilder, FixedClock, SystemClock, estimate_soil_moisture};
pub use detector::{ChangeDetector, ChangeTolerance};
pub use generator::{AdvisoryGenerator, GeneratorSettings, Replan};
pub use loop_runner::{
    AdvisoryLoop, AlwaysReplan, LoopLimits, LoopState, ReplanGate, SessionOutcome, Termination,
};
