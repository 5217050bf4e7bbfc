//! Configuration for the proxy binary.
//!
//! Flags and process environment are parsed with clap; anything still
//! unset falls back to the deployment env file, then to the defaults.

use clap::Parser;
use modelgate::envfile::EnvFile;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Streaming proxy for a local inference backend.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    /// Port to listen on. Falls back to PROXY_PORT from the env file,
    /// then 8001.
    #[arg(short, long, env = "PROXY_PORT")]
    pub port: Option<u16>,

    /// Backend port to forward to. Falls back to BACKEND_PORT from the
    /// env file, then 8000.
    #[arg(short, long, env = "BACKEND_PORT")]
    pub backend_port: Option<u16>,

    /// Deployment root holding config.env.
    #[arg(short, long, env = "MODELGATE_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Port for the metrics server.
    #[arg(long, env = "METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// Enable the prometheus metrics server.
    #[arg(short, long, env = "METRICS_ENABLED", default_value_t = true)]
    pub metrics: bool,

    /// Prefix for exported metric names.
    #[arg(long, env = "METRICS_PREFIX", default_value = "modelgate")]
    pub metrics_prefix: String,

    /// Connect timeout towards the backend, in seconds.
    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Total per-request timeout towards the backend, in seconds.
    #[arg(long, default_value_t = 300)]
    pub request_timeout_secs: u64,

    #[arg(long, default_value_t = 100)]
    pub pool_max_idle_per_host: usize,

    #[arg(long, default_value_t = 90)]
    pub pool_idle_timeout_secs: u64,
}

/// Fully resolved settings: CLI flags merged with the deployment env file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub backend: Url,
    pub metrics_port: u16,
    pub metrics: bool,
    pub metrics_prefix: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
}

impl Config {
    /// Merge the CLI/env values with the deployment env file. Flags win,
    /// then env file entries, then the defaults.
    pub async fn resolve(self) -> anyhow::Result<Settings> {
        let env_file = EnvFile::load(&self.root.join("config.env")).await?;

        let port = match self.port {
            Some(p) => p,
            None => env_file.port("PROXY_PORT", 8001),
        };
        let backend_port = match self.backend_port {
            Some(p) => p,
            None => env_file.port("BACKEND_PORT", 8000),
        };
        let backend = Url::parse(&format!("http://localhost:{backend_port}"))?;

        debug!(port, %backend, "resolved settings");

        Ok(Settings {
            port,
            backend,
            metrics_port: self.metrics_port,
            metrics: self.metrics,
            metrics_prefix: self.metrics_prefix,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            pool_max_idle_per_host: self.pool_max_idle_per_host,
            pool_idle_timeout: Duration::from_secs(self.pool_idle_timeout_secs),
        })
    }
}
