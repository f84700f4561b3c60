/*!
# Telescope Host

Polls every configured telescope from a single thread, reports connection
changes and prints a periodic status summary.

## Usage

### Poll all telescopes
```bash
telescoped --config telescoped.toml run
```

### JSON status lines, stop after 100 ticks
```bash
telescoped run --json --ticks 100
```

### Slew a telescope once it is connected
```bash
telescoped goto --name Simulator --ra 5.5 --dec -5.4
```

### Write a default configuration
```bash
telescoped config --output telescoped.toml
```
*/

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use telescope_client::ClientContext;
use tracing::{info, warn, Level};

mod config;
mod frames;
mod host;

use config::AppConfig;
use frames::PrecessionFrames;
use host::TelescopeHost;

#[derive(Parser)]
#[command(name = "telescoped")]
#[command(about = "Non-blocking telescope control host")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "telescoped.toml")]
    config: PathBuf,

    /// Log debug messages
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll all configured telescopes
    Run {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,

        /// Print status as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Send one telescope to J2000 coordinates
    Goto {
        /// Telescope name
        #[arg(short, long)]
        name: String,

        /// Right ascension in hours
        #[arg(long, allow_hyphen_values = true)]
        ra: f64,

        /// Declination in degrees
        #[arg(long, allow_hyphen_values = true)]
        dec: f64,

        /// Keep polling for this many ticks instead of stopping once the goto is sent
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "telescoped.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so status lines on stdout stay parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Commands::Run { ticks, json } => {
            let mut host = build_host(&cli.config)?;
            if json {
                host.set_json_status(true);
            }
            run_host(host, ticks, false)
        }

        Commands::Goto { name, ra, dec, ticks } => {
            let mut host = build_host(&cli.config)?;
            host.queue_goto(&name, ra, dec)?;
            // Without a tick limit there is nothing left to do once the goto is out
            run_host(host, ticks, ticks.is_none())
        }

        Commands::Config { output } => generate_config_file(output),
    }
}

/// Load the configuration, falling back to defaults when the file is missing
fn build_host(config_path: &Path) -> Result<TelescopeHost> {
    let config = if config_path.exists() {
        info!("📝 Loading config from {}", config_path.display());
        AppConfig::load_from_file(config_path)?
    } else {
        warn!("⚠️ {} not found, using defaults", config_path.display());
        AppConfig::new()
    };

    let context = ClientContext {
        frames: Arc::new(PrecessionFrames::now()),
        ..ClientContext::default()
    };
    TelescopeHost::new(&config, context)
}

fn run_host(mut host: TelescopeHost, ticks: Option<u64>, until_goto_sent: bool) -> Result<()> {
    let running = host.running_flag();
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Received Ctrl+C, shutting down gracefully...");
        running.store(false, std::sync::atomic::Ordering::SeqCst);
    })?;

    if until_goto_sent {
        host.run_until_goto_sent(ticks)?;
    } else {
        host.run(ticks)?;
    }
    if host.goto_pending() {
        bail!("goto was not sent: telescope never connected");
    }
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to add telescopes, then run:");
    println!("   telescoped --config {} run", output_path.display());

    Ok(())
}
