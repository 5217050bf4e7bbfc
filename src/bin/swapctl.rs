//! Control-plane CLI: inspect and hot-swap the active model.
//!
//! Every command prints one JSON document to stdout so it can be scripted.
//! Diagnostics go to stderr via tracing.

use clap::{Parser, Subcommand};
use modelgate::envfile::EnvFile;
use modelgate::probe::HttpProbe;
use modelgate::swap::{SwapPaths, SwapService, SwitchOptions};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Inspect and hot-swap the active model")]
struct Args {
    /// Deployment root holding config.env, config.json and run/.
    #[arg(short, long, env = "MODELGATE_ROOT", default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the configured model and live backend readiness.
    Status,
    /// List models known to the registry.
    List,
    /// Swap the active model, waiting for the backend to serve it.
    Switch {
        /// Model name, as known to the registry (or arbitrary with --path).
        model: String,

        /// Explicit model path, overriding the registry lookup.
        #[arg(long)]
        path: Option<String>,

        /// Seconds to wait for the backend before rolling back.
        #[arg(long, default_value_t = 180)]
        timeout: u64,

        /// Apply the config and return without waiting for readiness.
        #[arg(long)]
        no_wait: bool,

        /// Report what would change without touching any file.
        #[arg(long)]
        dry_run: bool,
    },
    /// Restore the previous config from the backup.
    Rollback,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(output) => println!("{}", pretty(&output)),
        Err(e) => {
            println!("{}", pretty(&json!({ "error": e.to_string() })));
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<serde_json::Value> {
    let paths = SwapPaths::new(&args.root);
    let env_file = EnvFile::load(&paths.env_file).await?;
    let backend_port = env_file.port("BACKEND_PORT", 8000);
    let service = SwapService::new(paths, HttpProbe::new(backend_port), backend_port);

    let output = match args.command {
        Command::Status => serde_json::to_value(service.status().await?)?,
        Command::List => json!({ "models": service.list().await? }),
        Command::Switch {
            model,
            path,
            timeout,
            no_wait,
            dry_run,
        } => {
            let opts = SwitchOptions {
                path,
                timeout: Duration::from_secs(timeout),
                no_wait,
                dry_run,
            };
            serde_json::to_value(service.switch(&model, opts).await?)?
        }
        Command::Rollback => serde_json::to_value(service.rollback().await?)?,
    };

    Ok(output)
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
