use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_roulette::config::{Config, LoggingConfig};
use media_roulette::engine::RouletteEngine;
use media_roulette::metrics;
use media_roulette::models::{MediaContent, Outcome, Request, Requester};
use media_roulette::utils::truncate_text;

#[derive(Parser)]
#[command(
    name = "roulette",
    version,
    about = "Media roulette: random media from pluggable sources",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured `logging.format`
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one spin against the configured providers
    Spin {
        /// Category or query filter
        #[arg(short, long)]
        query: Option<String>,

        /// Number of items wanted
        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Restrict the spin to one provider id
        #[arg(short, long)]
        provider: Option<String>,

        /// Configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the metrics exposition after the spin
        #[arg(long, default_value = "false")]
        metrics: bool,
    },

    /// List configured providers and their health
    Providers {
        /// Configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file
    CheckConfig {
        /// Configuration file (TOML)
        #[arg(long)]
        config: PathBuf,
    },
}

impl Commands {
    fn config_path(&self) -> Option<&Path> {
        match self {
            Commands::Spin { config, .. } | Commands::Providers { config } => config.as_deref(),
            Commands::CheckConfig { config } => Some(config),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.command.config_path())?;

    // Initialize tracing/logging
    setup_tracing(&config.logging, cli.log_format.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Spin {
            query,
            count,
            provider,
            metrics,
            ..
        } => {
            tracing::info!(
                query = ?query,
                count = %count,
                provider = ?provider,
                "Starting spin command"
            );
            spin(&config, query, count, provider, metrics).await?;
        }

        Commands::Providers { .. } => providers(&config)?,

        Commands::CheckConfig { config: path } => check_config(&config, &path)?,
    }

    Ok(())
}

/// CLI flags win over the `[logging]` section
fn setup_tracing(logging: &LoggingConfig, format: Option<&str>, verbose: bool) -> Result<()> {
    let directives = logging.filter_directives(verbose);
    let env_filter = tracing_subscriber::EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter '{directives}'"))?;

    match format.unwrap_or(logging.format.as_str()) {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// File configuration with environment overrides, or environment only
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => Config::from_env(),
    };
    Ok(config)
}

async fn spin(
    config: &Config,
    query: Option<String>,
    count: usize,
    provider: Option<String>,
    print_metrics: bool,
) -> Result<()> {
    if print_metrics {
        metrics::init_metrics().map_err(|e| anyhow!("metrics registration failed: {e}"))?;
    }
    let engine = RouletteEngine::from_config(config)?;

    let mut request = Request::new(Requester::user("cli")).with_count(count);
    if let Some(query) = query {
        request = request.with_query(query);
    }
    if let Some(provider) = provider {
        request = request.pinned_to(provider);
    }

    match engine.spin(&request).await {
        Outcome::Success(success) => {
            for item in &success.items {
                let location = match item.content() {
                    MediaContent::Url(url) => url.clone(),
                    MediaContent::Bytes { data, mime } => format!("<{} bytes of {mime}>", data.len()),
                };
                println!("[{}] {} {}", item.provider(), item.kind().as_str(), location);
                if let Some(title) = item.title() {
                    println!("    {}", truncate_text(title, 80));
                }
            }
            if success.is_partial() {
                println!(
                    "Only {} of {} requested items were available",
                    success.items.len(),
                    success.requested
                );
            }
            if success.cache_hit {
                println!("(served partly from cache)");
            }
            for failure in &success.failures {
                println!("  skipped {failure}");
            }
        }
        Outcome::Exhausted(exhausted) => {
            println!("No media: {:?}", exhausted.reason());
            for failure in &exhausted.errors {
                println!("  {failure}");
            }
        }
    }

    if print_metrics {
        let text = metrics::gather_metrics().map_err(|e| anyhow!("gathering metrics failed: {e}"))?;
        println!("\n{text}");
    }

    Ok(())
}

fn providers(config: &Config) -> Result<()> {
    let engine = RouletteEngine::from_config(config)?;

    println!(
        "{:<16} {:>6} {:<8} {:<9} {:<6} {:<10} {:>8}",
        "ID", "WEIGHT", "ENABLED", "HEALTH", "QUERY", "PAGINATION", "FAILURES"
    );
    for d in engine.health() {
        println!(
            "{:<16} {:>6} {:<8} {:<9} {:<6} {:<10} {:>8}",
            d.id,
            d.weight,
            d.enabled,
            d.health.as_str(),
            d.capabilities.supports_query,
            d.capabilities.supports_pagination,
            d.consecutive_failures
        );
    }
    Ok(())
}

fn check_config(config: &Config, path: &Path) -> Result<()> {
    config.validate()?;
    // Building providers catches unknown boards, missing corpus files and
    // dangling inner references.
    RouletteEngine::from_config(config)?;
    println!(
        "{}: ok ({} providers)",
        path.display(),
        config.providers.len()
    );
    Ok(())
}
