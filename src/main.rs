//! testflux CLI - Test-run telemetry for InfluxDB.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use testflux::classify::PathClassifier;
use testflux::clock::SystemClock;
use testflux::config::{self, Config, ProcessEnv};
use testflux::events::EventReader;
use testflux::report::{ConsoleReporter, InfluxReporter, MultiReporter, replay};
use testflux::sink::{InfluxSink, MemorySink, Sink};

#[derive(Parser)]
#[command(name = "testflux")]
#[command(about = "Report test-run results to InfluxDB", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults apply when it does not exist)
    #[arg(short, long, default_value = "testflux.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines lifecycle event stream and report it
    Report {
        /// Event stream file (reads stdin when omitted)
        #[arg(short, long)]
        events: Option<PathBuf>,
    },

    /// Check that the configured InfluxDB answers
    Ping,

    /// Validate configuration and print the resolved settings
    Validate,

    /// Initialize a new configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with report output.
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Report { events } => report(&cli.config, events.as_deref(), cli.verbose).await,
        Commands::Ping => ping(&cli.config).await,
        Commands::Validate => validate_config(&cli.config),
        Commands::Init => init_config(&cli.config),
    }
}

fn load(config_path: &Path) -> Result<Config> {
    config::resolve_config(config_path, &ProcessEnv)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))
}

async fn report(config_path: &Path, events: Option<&Path>, verbose: bool) -> Result<()> {
    // A broken configuration only costs the upload; the run is still reported.
    let loaded = load(config_path).and_then(|config| {
        let classifier =
            PathClassifier::from_config(&config.classify).context("Invalid application pattern")?;
        Ok((config, classifier))
    });
    let (config, classifier) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            warn!("{:#}; test results will not be uploaded", e);
            (Config::default(), PathClassifier::new())
        }
    };
    let classifier = Arc::new(classifier);
    let clock = Arc::new(SystemClock::new());

    let mut reporter = MultiReporter::new().with_reporter(ConsoleReporter::new(verbose));
    reporter = match InfluxSink::new(&config.influx) {
        Ok(sink) => {
            reporter.with_reporter(InfluxReporter::from_config(&config, sink, clock, classifier))
        }
        Err(e) => {
            // Keep the accumulator so out-of-order streams are still caught.
            warn!("Cannot create InfluxDB client: {}; test results will not be uploaded", e);
            reporter.with_reporter(
                InfluxReporter::from_config(&config, MemorySink::new(), clock, classifier)
                    .with_telemetry(false),
            )
        }
    };

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match events {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open event stream {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut reader = EventReader::new(input);
    let handled = replay(&mut reader, &mut reporter)
        .await
        .context("Failed to report test run")?;
    info!("Handled {} lifecycle events", handled);

    Ok(())
}

async fn ping(config_path: &Path) -> Result<()> {
    let config = load(config_path)?;
    let sink = InfluxSink::new(&config.influx).context("Failed to create InfluxDB client")?;
    let timeout = Duration::from_millis(config.reporter.ping_timeout_ms);

    match tokio::time::timeout(timeout, sink.ping()).await {
        Ok(Ok(ping)) => {
            println!(
                "{} {} (version {}, {:?})",
                console::style("online").green().bold(),
                sink.base_url(),
                ping.version.as_deref().unwrap_or("unknown"),
                ping.rtt
            );
            Ok(())
        }
        Ok(Err(e)) => bail!("{} is offline: {}", sink.base_url(), e),
        Err(_) => bail!("{} did not answer within {:?}", sink.base_url(), timeout),
    }
}

fn validate_config(config_path: &Path) -> Result<()> {
    let config = match load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = PathClassifier::from_config(&config.classify) {
        eprintln!("Configuration error: invalid application pattern: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    println!("Configuration is valid!");
    println!();
    println!("Settings:");
    println!("  Enabled: {}", config.reporter.enabled);
    println!("  Release version: {}", config.reporter.release_version);
    println!("  Flush: {:?}", config.reporter.flush);
    println!(
        "  Measurements: {}, {}",
        config.reporter.test_measurement, config.reporter.run_measurement
    );
    println!("  InfluxDB: {}", config.influx.base_url());
    println!("  Database: {}", config.influx.database);
    println!("  User: {}", config.influx.username);
    println!("  Password: {}", mask(&config.influx.password));
    if let Some(retention) = &config.influx.retention {
        println!(
            "  Retention: {} ({}, replication {})",
            retention.name, retention.duration, retention.replication
        );
    }
    println!("  Application rules: {}", config.classify.applications.len());
    if let Some(project) = &config.classify.project_name {
        println!("  Project name: {}", project);
    }

    Ok(())
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "(empty)" } else { "********" }
}

const DEFAULT_CONFIG: &str = r#"# testflux configuration file
#
# Environment variables override these settings:
#   TEST_RESULTS_ENABLED, CI_RELEASE_VERSION, CI_PROJECT_NAME,
#   TEST_RESULTS_INFLUX_HOST, TEST_RESULTS_INFLUX_PORT, TEST_RESULTS_INFLUX_DB,
#   TEST_RESULTS_INFLUX_USER, TEST_RESULTS_INFLUX_PASSWORD

[reporter]
enabled = false
release_version = "UNK"
# "batch" writes everything at task end, "per_test" after every test
flush = "batch"
test_measurement = "test"
run_measurement = "run"
ping_timeout_ms = 5000

[influx]
protocol = "http"
host = "localhost"
port = 8086
database = "testresults"
username = "root"
password = "root"
timeout_secs = 30

# Create a default retention policy before the first write
# [influx.retention]
# name = "defaultPolicy"
# duration = "30d"
# replication = 1

[classify]
# project_name = "my-project"

# [[classify.applications]]
# pattern = "apps/shop/"
# name = "SHOP"
"#;

fn init_config(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit manually.",
            config_path.display()
        );
        std::process::exit(1);
    }

    std::fs::write(config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created {}", config_path.display());
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  testflux report --events events.jsonl");

    Ok(())
}
