//! chatbridge CLI
//!
//! Sends one message to the desktop chat application and prints the captured
//! response as a JSON document, suitable for piping into other tools.

use anyhow::Context;
use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;

use chatbridge::{BridgeConfig, BridgeError, Metrics, QueryOutcome};

#[derive(Parser)]
#[command(name = "chatbridge")]
#[command(version)]
#[command(about = "Drive a desktop chat app and capture the response", long_about = None)]
struct Cli {
    /// Message to send; read from stdin when omitted
    message: Option<String>,

    /// Continue the current conversation instead of opening a new one
    #[arg(long = "continue", short = 'c')]
    continue_conversation: bool,

    /// Application (process) name to automate
    #[arg(long, default_value = "ChatGPT")]
    app: String,

    /// Delay between UI reads, in milliseconds
    #[arg(long, default_value_t = 5000)]
    interval_ms: u64,

    /// Consecutive identical reads required before the response counts as final
    #[arg(long, default_value_t = 2)]
    stable_checks: u32,

    /// Soft deadline for the whole wait, in milliseconds
    #[arg(long, default_value_t = 1_200_000)]
    max_wait_ms: u64,

    /// Write the result JSON to this file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug)
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn bridge_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig {
            app_name: self.app.clone(),
            ..Default::default()
        };
        config.poll.check_interval = Duration::from_millis(self.interval_ms);
        config.poll.stable_checks = self.stable_checks;
        config.poll.max_wait = Duration::from_millis(self.max_wait_ms);
        config
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        // Keep stdout clean for the result JSON.
        .with_writer(std::io::stderr)
        .init();
}

fn read_message(cli: &Cli) -> anyhow::Result<String> {
    let message = match &cli.message {
        Some(text) => text.clone(),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read message from stdin")?;
            buffer
        }
    };
    let message = message.trim().to_string();
    anyhow::ensure!(!message.is_empty(), "message is empty");
    Ok(message)
}

/// First 100 characters of the message, with an ellipsis when cut.
fn preview(message: &str) -> String {
    let head: String = message.chars().take(100).collect();
    if head.len() < message.len() {
        format!("{head}...")
    } else {
        head
    }
}

/// Hard bridge errors still produce the same JSON document shape as a
/// soft-failed run, so callers can always parse stdout.
fn failure_outcome(message: &str, err: &BridgeError, elapsed_secs: u64) -> QueryOutcome {
    QueryOutcome {
        success: false,
        message: preview(message),
        response: None,
        error: Some(err.to_string()),
        elapsed: elapsed_secs,
        metrics: Metrics::default(),
    }
}

fn write_output(outcome: &QueryOutcome, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(outcome).context("failed to serialize outcome")?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(target_os = "macos")]
async fn execute(
    message: &str,
    new_conversation: bool,
    config: BridgeConfig,
) -> Result<QueryOutcome, BridgeError> {
    let driver = chatbridge::MacOsDriver::new(&config);
    let mut bridge = chatbridge::ChatBridge::new(driver, config);
    bridge.query(message, new_conversation).await
}

#[cfg(not(target_os = "macos"))]
async fn execute(
    _message: &str,
    _new_conversation: bool,
    _config: BridgeConfig,
) -> Result<QueryOutcome, BridgeError> {
    Err(BridgeError::Platform(
        "this build has no automation driver for the current platform".to_string(),
    ))
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let message = read_message(&cli)?;
    let config = cli.bridge_config();
    let started = std::time::Instant::now();

    let outcome = match execute(&message, !cli.continue_conversation, config).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(error = %err, "query failed");
            failure_outcome(&message, &err, started.elapsed().as_secs())
        }
    };

    write_output(&outcome, cli.output.as_deref())?;
    Ok(outcome.success)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
