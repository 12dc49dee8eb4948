//! `farmloop advise`: Build a plan and keep it in step with the weather.

use async_trait::async_trait;
use chrono::NaiveDate;
use farmloop_agent::{
    AdvisoryGenerator, AdvisoryLoop, ChangeDetector, ChangeTolerance, ContextBuilder, FixedClock,
    GeneratorSettings, LoopLimits, ReplanGate, SessionOutcome, Termination,
};
use farmloop_config::AppConfig;
use farmloop_core::event::{DomainEvent, EventBus};
use farmloop_core::farm::FarmInput;
use farmloop_core::plan::{AdvisoryPlan, ChangeSignal};
use farmloop_core::provider::Provider;
use farmloop_providers::router;
use farmloop_weather::{NominatimResolver, OpenMeteoSource, SoilGridsSource};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub struct AdviseArgs {
    pub crop: Option<String>,
    pub sowing_date: Option<String>,
    pub location: Option<String>,
    pub today: Option<String>,
    pub json: bool,
    pub confirm: bool,
    pub max_iterations: Option<u32>,
}

pub async fn run(args: AdviseArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Hosted providers need a key; fail before asking the farmer anything
    if !config.has_api_key() && !router::is_local(&config.default_provider) {
        eprintln!();
        eprintln!("  ERROR: No API key configured for '{}'!", config.default_provider);
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    FARMLOOP_API_KEY=...   (generic)");
        eprintln!("    GROQ_API_KEY=...       (for Groq)");
        eprintln!("    OPENAI_API_KEY=...     (for OpenAI)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        eprintln!("  Or run a local model: default_provider = \"ollama\"");
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let today = super::today_override(args.today.as_deref())?;
    if let Some(date) = today {
        tracing::debug!(%date, "Using --today override");
    }
    let input = FarmInput::parse(
        &value_or_prompt(args.crop, "Crop (e.g. wheat, rice, cotton)")?,
        &value_or_prompt(args.sowing_date, "Sowing date (YYYY-MM-DD)")?,
        &value_or_prompt(args.location, "Village / district / city")?,
    )?;

    let router = router::build_from_config(&config);
    let provider = router.default().ok_or("No default provider configured")?;

    let event_bus = Arc::new(EventBus::default());
    let mut advisory_loop = build_loop(&config, provider, today, event_bus.clone());
    if let Some(max) = args.max_iterations {
        advisory_loop = advisory_loop.with_max_iterations(max);
    }
    if args.confirm {
        advisory_loop = advisory_loop.with_gate(Arc::new(ConfirmGate));
    }

    let progress = spawn_progress(&event_bus);
    let result = advisory_loop.run(&input).await;

    // Closing the bus lets the progress task drain and exit
    drop(advisory_loop);
    drop(event_bus);
    let _ = progress.await;

    let outcome = result?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(())
}

/// Wire the HTTP collaborators and the loop from configuration.
pub(crate) fn build_loop(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    today: Option<NaiveDate>,
    event_bus: Arc<EventBus>,
) -> AdvisoryLoop {
    let mut builder = ContextBuilder::new(
        Arc::new(NominatimResolver::from_config(&config.weather)),
        Arc::new(OpenMeteoSource::from_config(&config.weather)),
    )
    .with_stage_table(config.stage_table())
    .with_thresholds(config.weather.thresholds());

    if config.soil.enabled {
        builder = builder.with_soil(Arc::new(SoilGridsSource::from_config(
            &config.soil,
            &config.weather,
        )));
    }
    if let Some(date) = today {
        builder = builder.with_clock(Arc::new(FixedClock::new(date)));
    }

    let generator = AdvisoryGenerator::new(provider, GeneratorSettings::from_config(config))
        .with_event_bus(event_bus.clone());
    let detector = ChangeDetector::new(ChangeTolerance::from(&config.tolerance));

    AdvisoryLoop::new(builder, generator, detector, event_bus)
        .with_limits(LoopLimits::from(&config.advisory_loop))
}

fn value_or_prompt(value: Option<String>, label: &str) -> io::Result<String> {
    match value {
        Some(v) => Ok(v),
        None => {
            eprint!("{label}: ");
            io::stderr().flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line.trim().to_string())
        }
    }
}

/// Asks on the terminal before each regeneration.
struct ConfirmGate;

#[async_trait]
impl ReplanGate for ConfirmGate {
    async fn approve(&self, current: &AdvisoryPlan, signal: &ChangeSignal) -> bool {
        eprintln!(
            "\n  Conditions changed since plan #{}: {}",
            current.iteration,
            signal.reason.as_deref().unwrap_or("unknown")
        );
        eprint!("  Regenerate the plan? [Y/n] ");
        let _ = io::stderr().flush();

        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => accepts(&line),
            _ => false,
        }
    }
}

fn accepts(answer: &str) -> bool {
    !matches!(answer.trim().to_lowercase().as_str(), "n" | "no")
}

/// Print loop progress to stderr until the session ends or the bus closes.
fn spawn_progress(event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            match event.as_ref() {
                DomainEvent::ContextBuilt {
                    crop,
                    stage,
                    precipitation,
                    ..
                } => eprintln!("  📍 {crop}: {stage} stage, forecast {precipitation}"),
                DomainEvent::PlanGenerated {
                    iteration, model, ..
                } => eprintln!("  📝 Plan #{iteration} ready ({model})"),
                DomainEvent::GenerationRetried {
                    attempt,
                    error_message,
                    ..
                } => eprintln!("  ⚠️  Attempt {attempt} failed: {error_message}; retrying"),
                DomainEvent::ConditionsEvaluated {
                    changed: true,
                    reason,
                    ..
                } => eprintln!(
                    "  🚨 Weather changed → replanning ({})",
                    reason.as_deref().unwrap_or("unknown")
                ),
                DomainEvent::ConditionsEvaluated { .. } => {
                    eprintln!("  ✅ Conditions unchanged")
                }
                DomainEvent::SessionFinished { .. } | DomainEvent::ErrorOccurred { .. } => break,
            }
        }
    })
}

fn print_outcome(outcome: &SessionOutcome) {
    let context = &outcome.final_context;
    println!();
    println!(
        "🌾 7-day plan: {} in {} ({} stage, day {})",
        context.crop, context.location, context.crop_stage, context.elapsed_days
    );
    println!("========================================\n");
    println!("{}", outcome.final_plan);
    println!();

    let plans = outcome.iterations;
    match outcome.termination {
        Termination::Stable => println!("✅ Conditions stable after {plans} plan(s)."),
        Termination::IterationCap => println!(
            "⚠️  Conditions were still changing after {plans} plans; this is the latest."
        ),
        Termination::TimeBudget => {
            println!("⚠️  Time budget ran out; this is the latest plan.")
        }
        Termination::Declined => {
            println!("Kept plan #{} at your request.", outcome.final_plan.iteration)
        }
    }
}
