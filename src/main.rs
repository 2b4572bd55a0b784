use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use abuse_throttle::config::ThrottleConfig;
use abuse_throttle::throttle::{Category, ThrottleEngine};

/// Operator tooling for the abuse throttling engine.
#[derive(Debug, Parser)]
#[command(name = "abuse-throttle", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the effective policy for every category
    Policies,

    /// Run a burst of attempts through an engine and print each decision
    Simulate {
        /// Category to attempt
        #[arg(long)]
        category: Category,

        /// Identifier making the attempts
        #[arg(long)]
        identifier: String,

        /// Number of attempts
        #[arg(long, default_value_t = 10)]
        attempts: u32,

        /// Pause between attempts, in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,

        /// Report every allowed attempt as successful
        #[arg(long)]
        succeed: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ThrottleConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let registry = config.registry()?;

    match cli.command {
        Command::Policies => {
            for (category, policy) in registry.iter() {
                let line = serde_json::json!({
                    "category": category,
                    "max_attempts": policy.max_attempts,
                    "window_secs": policy.window.as_secs(),
                    "block_duration_secs": policy.block_duration.as_secs(),
                    "warning_ratio": policy.warning_ratio,
                    "warning_threshold": policy.warning_threshold(),
                });
                println!("{}", line);
            }
        }
        Command::Simulate {
            category,
            identifier,
            attempts,
            interval_ms,
            succeed,
        } => {
            let engine = ThrottleEngine::new(registry, config.engine)?;
            engine.start()?;

            for attempt in 1..=attempts {
                let decision = engine.check_and_record(category, &identifier);
                if succeed && decision.allowed {
                    engine.record_outcome(category, &identifier, true);
                }
                let line = serde_json::json!({ "attempt": attempt, "decision": decision });
                println!("{}", line);

                if interval_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            }

            println!("{}", serde_json::to_string(&engine.get_statistics())?);
            engine.stop().await;
        }
    }

    Ok(())
}
