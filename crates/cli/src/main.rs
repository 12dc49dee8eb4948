//! FarmLoop CLI: the main entry point.
//!
//! Commands:
//! - `advise`  : Build a 7-day plan and keep it current with the weather
//! - `stage`   : Show the growth stage for a crop and sowing date
//! - `onboard` : Write a default config
//! - `doctor`  : Diagnose config, provider and weather reachability

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "farmloop",
    about = "FarmLoop — weather-aware crop advisories",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a 7-day advisory, regenerating it while conditions change
    Advise {
        /// Crop name, e.g. wheat
        #[arg(long)]
        crop: Option<String>,

        /// Sowing date (YYYY-MM-DD or DD-MM-YYYY)
        #[arg(long)]
        sowing_date: Option<String>,

        /// Village, district or city
        #[arg(long)]
        location: Option<String>,

        /// Pretend today is this date
        #[arg(long)]
        today: Option<String>,

        /// Print the session outcome as JSON
        #[arg(long)]
        json: bool,

        /// Ask before each regeneration
        #[arg(long)]
        confirm: bool,

        /// Override loop.max_iterations
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Show days since sowing and the current growth stage
    Stage {
        #[arg(long)]
        crop: String,

        #[arg(long)]
        sowing_date: String,

        #[arg(long)]
        today: Option<String>,
    },

    /// Initialize configuration
    Onboard,

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Advise {
            crop,
            sowing_date,
            location,
            today,
            json,
            confirm,
            max_iterations,
        } => {
            commands::advise::run(commands::advise::AdviseArgs {
                crop,
                sowing_date,
                location,
                today,
                json,
                confirm,
                max_iterations,
            })
            .await?
        }
        Commands::Stage {
            crop,
            sowing_date,
            today,
        } => commands::stage::run(&crop, &sowing_date, today.as_deref())?,
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
