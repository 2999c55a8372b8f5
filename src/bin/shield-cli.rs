use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use gateway_shield::admin::DIAGNOSTICS_PATH;
use gateway_shield::config::loader::load_with_env;
use gateway_shield::config::{ConfigError, EnvSource};
use gateway_shield::routing::resolver;

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Operator CLI for the Gateway Shield", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the identifiers derived for an environment
    Resolve {
        /// Environment name; omit for the legacy deployment
        #[arg(short, long)]
        env: Option<String>,
    },
    /// Validate a configuration file with the current environment applied
    CheckConfig { path: PathBuf },
    /// Fetch the diagnostics view from a running shield
    Status {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,

        /// Signed identity assertion for the gated diagnostics route
        #[arg(short, long)]
        assertion: Option<String>,

        #[arg(long, default_value = "cf-access-jwt-assertion")]
        header: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve { env } => {
            let env = env.as_deref();
            println!("bucket:      {}", resolver::bucket_name(env));
            println!("mount path:  {}", resolver::mount_path(env));
            println!("instance id: {}", resolver::instance_id(env));
        }
        Commands::CheckConfig { path } => {
            match load_with_env(Some(&path), &EnvSource::from_process()) {
                Ok(config) => {
                    println!("{}: ok", path.display());
                    println!(
                        "instance id: {}",
                        resolver::instance_id(config.environment.as_deref())
                    );
                }
                Err(ConfigError::Validation(errors)) => {
                    eprintln!("{}: {} problem(s)", path.display(), errors.len());
                    for error in errors {
                        eprintln!("  - {}", error);
                    }
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("{}: {}", path.display(), e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Status {
            url,
            assertion,
            header,
        } => {
            let client = reqwest::Client::new();
            let mut request = client.get(format!("{}{}", url.trim_end_matches('/'), DIAGNOSTICS_PATH));
            if let Some(assertion) = assertion {
                request = request.header(header, assertion);
            }
            print_response(request.send().await?).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: shield returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
