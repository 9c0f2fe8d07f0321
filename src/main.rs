//! Command line entry point for the team-elo rating engine
//!
//! Records results, ingests match files, predicts fixtures, calibrates
//! prediction weights and prints standings for the configured pools.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use team_elo::config::{validate_config, AppConfig};
use team_elo::ingest::{apply_lines, read_labeled};
use team_elo::metrics::MetricsCollector;
use team_elo::pool::PoolRegistry;
use tracing::{error, info, warn};

/// Team Elo - ratings, recent form and match outcome prediction
#[derive(Parser)]
#[command(
    name = "team-elo",
    version,
    about = "Elo ratings, recent form and win/draw/loss prediction for team competitions",
    long_about = "team-elo maintains Elo ratings for teams in independent pools, tracks a short \
                 window of recent form, predicts win/draw/loss probabilities for fixtures and \
                 calibrates how much weight recent form should get in predictions."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Write Prometheus metrics on exit
    #[arg(long, value_name = "FILE", help = "Write Prometheus metrics text to FILE on exit")]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a single match result
    Record {
        #[arg(short, long)]
        pool: String,
        competitor_a: String,
        competitor_b: String,
        /// win_a, win_b or draw
        result: String,
    },

    /// Apply every match in a file, in order
    Ingest {
        #[arg(short, long)]
        pool: String,
        file: PathBuf,
    },

    /// Predict a fixture
    Predict {
        #[arg(short, long)]
        pool: String,
        competitor_a: String,
        competitor_b: String,
        #[arg(long, help = "Print JSON instead of text")]
        json: bool,
    },

    /// Search for the best Elo/form weighting against labeled matches
    Calibrate {
        #[arg(short, long)]
        pool: String,
        file: PathBuf,
        #[arg(long, help = "Grid spacing, overrides configuration")]
        step: Option<f64>,
        #[arg(long, help = "Print JSON instead of text")]
        json: bool,
    },

    /// Print the ratings table
    Standings {
        #[arg(short, long)]
        pool: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, help = "Print JSON instead of text")]
        json: bool,
    },

    /// Print the recent form table
    Form {
        #[arg(short, long)]
        pool: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, help = "Print JSON instead of text")]
        json: bool,
    },

    /// Validate configuration and exit
    Validate,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Load configuration from file or environment and apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    validate_config(&config)?;
    Ok(config)
}

fn display_config(config: &AppConfig) {
    println!("Service: {}", config.service.name);
    println!("  Log level: {}", config.service.log_level);
    println!("  K-factor: {}", config.rating.k_factor);
    println!("  Initial rating: {}", config.rating.initial_rating);
    println!("  Form reduction: {}", config.form.reduction);
    println!(
        "  Weights: elo {} / form {}",
        config.prediction.weight_elo, config.prediction.weight_form
    );
    println!(
        "  Unknown competitors: {}",
        if config.prediction.auto_create_unknown {
            "created"
        } else {
            "rejected"
        }
    );
    for pool in &config.pools {
        match &pool.form_path {
            Some(form_path) => println!(
                "  Pool {}: {} (form: {})",
                pool.name,
                pool.ratings_path.display(),
                form_path.display()
            ),
            None => println!("  Pool {}: {}", pool.name, pool.ratings_path.display()),
        }
    }
}

fn run(command: Command, config: &AppConfig, registry: &PoolRegistry) -> Result<()> {
    match command {
        Command::Record {
            pool,
            competitor_a,
            competitor_b,
            result,
        } => {
            let pool = registry.get(&pool)?;
            let update = pool.apply_labeled(&competitor_a, &competitor_b, &result)?;
            for change in [&update.rating_a, &update.rating_b] {
                println!(
                    "{}: {:.0} -> {:.0} ({:+.1})",
                    change.competitor,
                    change.old.rating,
                    change.new.rating,
                    change.delta()
                );
            }
        }

        Command::Ingest { pool, file } => {
            let pool = registry.get(&pool)?;
            let text = std::fs::read_to_string(&file)?;
            let report = apply_lines(&pool, &text)?;
            println!(
                "Applied {} matches, skipped {}",
                report.applied,
                report.skipped.len()
            );
            for skipped in &report.skipped {
                println!("  line {}: {}", skipped.line, skipped.reason);
            }
        }

        Command::Predict {
            pool,
            competitor_a,
            competitor_b,
            json,
        } => {
            let pool = registry.get(&pool)?;
            let prediction = pool.predict(&competitor_a, &competitor_b)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                println!("{} vs {}", competitor_a, competitor_b);
                println!("  {} win: {:.1}%", competitor_a, prediction.win_a * 100.0);
                println!("  Draw: {:.1}%", prediction.draw * 100.0);
                println!("  {} win: {:.1}%", competitor_b, prediction.win_b * 100.0);
            }
        }

        Command::Calibrate {
            pool,
            file,
            step,
            json,
        } => {
            let pool = registry.get(&pool)?;
            let text = std::fs::read_to_string(&file)?;
            let (labeled, skipped) = read_labeled(&text);
            if !skipped.is_empty() {
                warn!(skipped = skipped.len(), "Ignored unreadable labeled matches");
            }

            let outcome = pool.calibrate(&labeled, step.unwrap_or(config.calibration.step))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!(
                    "Best weights: elo {:.2} / form {:.2}",
                    outcome.weight_elo, outcome.weight_form
                );
                println!(
                    "Accuracy: {:.1}% over {} matches",
                    outcome.accuracy * 100.0,
                    outcome.evaluated
                );
            }
        }

        Command::Standings { pool, limit, json } => {
            let pool = registry.get(&pool)?;
            let mut standings = pool.standings()?;
            standings.truncate(limit.unwrap_or(usize::MAX));
            if json {
                println!("{}", serde_json::to_string_pretty(&standings)?);
                return Ok(());
            }
            for standing in &standings {
                println!(
                    "{:>3}. {:<30} {:>6.0} {:>4}",
                    standing.rank, standing.competitor, standing.rating, standing.matches_played
                );
            }
        }

        Command::Form { pool, limit, json } => {
            let pool = registry.get(&pool)?;
            let mut table = pool.form_table()?;
            table.truncate(limit.unwrap_or(usize::MAX));
            if json {
                println!("{}", serde_json::to_string_pretty(&table)?);
                return Ok(());
            }
            if table.is_empty() {
                println!("No recent form recorded for pool {}", pool.name());
            }
            for entry in &table {
                let history: Vec<String> =
                    entry.history.iter().map(|d| format!("{:+.1}", d)).collect();
                println!(
                    "{:<30} {:>7.2}  {}",
                    entry.competitor,
                    entry.aggregate,
                    history.join(" ")
                );
            }
        }

        Command::Validate => display_config(config),
    }

    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration (CLI args can override environment/config file)
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if matches!(args.command, Command::Validate) {
        info!("Configuration validation successful");
        display_config(&config);
        return Ok(());
    }

    let metrics = Arc::new(MetricsCollector::new()?);
    let registry = match PoolRegistry::from_config(&config, Some(metrics.clone())) {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to open rating pools: {:#}", e);
            std::process::exit(1);
        }
    };

    let outcome = run(args.command, &config, &registry);

    if let Some(path) = &args.metrics_out {
        match metrics.render() {
            Ok(text) => {
                if let Err(e) = std::fs::write(path, text) {
                    warn!("Failed to write metrics to {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Failed to render metrics: {}", e),
        }
    }

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}
