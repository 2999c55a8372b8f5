//! Gateway Shield
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                  GATEWAY SHIELD                  │
//!                    │                                                  │
//!  Client Request    │  ┌──────────┐   ┌──────────┐   ┌─────────────┐   │
//!  ──────────────────┼─▶│   http   │──▶│ identity │──▶│  injection  │   │
//!                    │  │  server  │   │   gate   │   │ (token etc.)│   │
//!                    │  └──────────┘   └──────────┘   └──────┬──────┘   │
//!                    │                                       │          │
//!                    │                                       ▼          │
//!  Client Response   │  ┌──────────┐   ┌──────────┐   ┌─────────────┐   │
//!  ◀─────────────────┼──│ response │◀──│ ws relay │◀──│   routing   │◀──┼── Backend
//!                    │  │  scrub   │   │ sanitize │   │  instance   │   │   Gateway
//!                    │  └──────────┘   └──────────┘   └─────────────┘   │
//!                    │                                                  │
//!                    │  config · health probe · observability · admin   │
//!                    └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use gateway_shield::lifecycle::{self, StartupOptions};

#[derive(Parser)]
#[command(name = "gateway-shield")]
#[command(about = "Authenticating reverse proxy for a backend gateway", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults plus environment when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration file when it changes.
    #[arg(short, long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let options = StartupOptions {
        config_path: args.config,
        watch: args.watch,
    };

    match lifecycle::run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("gateway-shield: {}", e);
            ExitCode::FAILURE
        }
    }
}
