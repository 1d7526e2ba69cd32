use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hkd_config::LifecycleConfig;

mod commands;

#[derive(Parser)]
#[command(name = "hkd")]
#[command(about = "HookDesk strategy hook lifecycle CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> overlays)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Drive a scripted strategy through recorded trade events; prints one JSON line per event
    Replay {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true, num_args = 1..)]
        config_paths: Vec<String>,

        /// Replay script (JSON)
        #[arg(long)]
        script: String,

        /// Fail on config keys the driver does not read
        #[arg(long, default_value_t = false)]
        strict_config: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience); silent when missing.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = hkd_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Replay {
            config_paths,
            script,
            strict_config,
        } => {
            let loaded = commands::load_config(&config_paths, strict_config)?;
            let cfg = LifecycleConfig::from_loaded(&loaded)?;
            let script = commands::replay::load_replay_script(&script)?;

            tracing::info!(config_hash = %loaded.config_hash, trades = script.trades.len(), "replay/start");
            let lines = commands::replay::replay(&cfg, script).await?;
            for line in &lines {
                let json = serde_json::to_string(line).context("serialize replay line")?;
                println!("{json}");
            }
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries command output only.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
