use crate::server::backend::OllamaConfig;
use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use ordbok_tonic_core::ordbok::{ScanPolicy, WorkerConfig};
use reqwest::Url;
use std::path::PathBuf;

/// Runtime configuration for the `ordbok-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first), with defaults suitable for a single local Ollama
/// instance.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ordbok-tonic-server",
    version,
    about = "A gRPC service that explains Swedish words and suggests synonyms"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/ordbok.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Number of dispatcher workers pulling from the shared task queue.
    ///
    /// Each worker runs at most one backend call at a time, so this is also
    /// the maximum number of concurrent generations.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 1)]
    pub num_workers: usize,

    /// Seconds a word stays blocked after a generation attempt starts.
    ///
    /// Environment variable: `COOLDOWN_SECS`
    #[arg(long, env = "COOLDOWN_SECS", default_value_t = 30)]
    pub cooldown_secs: u64,

    /// Base interval between scans for words without an explanation.
    ///
    /// Environment variable: `SCAN_BASE_SECS`
    #[arg(long, env = "SCAN_BASE_SECS", default_value_t = 30)]
    pub scan_base_secs: u64,

    /// Longest interval between scans once the system has been idle.
    ///
    /// Environment variable: `SCAN_MAX_SECS`
    #[arg(long, env = "SCAN_MAX_SECS", default_value_t = 300)]
    pub scan_max_secs: u64,

    /// Delay before retrying a scan that failed to query the store.
    ///
    /// Environment variable: `SCAN_RETRY_SECS`
    #[arg(long, env = "SCAN_RETRY_SECS", default_value_t = 5)]
    pub scan_retry_secs: u64,

    /// Seconds to wait for workers to finish their current task on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,

    /// JSON file holding the stored words. Words are kept in memory only when
    /// unset.
    ///
    /// Environment variable: `STORE_PATH`
    #[arg(long, env = "STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Base URL of the Ollama server.
    ///
    /// Environment variable: `OLLAMA_HOST`
    #[arg(long, env = "OLLAMA_HOST", default_value_t = String::from("http://localhost:11434"))]
    pub ollama_host: String,

    /// Model used for generation.
    ///
    /// Environment variable: `OLLAMA_MODEL`
    #[arg(long, env = "OLLAMA_MODEL", default_value_t = String::from("llama3.2"))]
    pub ollama_model: String,

    /// Timeout for a single generation request.
    ///
    /// Environment variable: `BACKEND_TIMEOUT_SECS`
    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value_t = 120)]
    pub backend_timeout_secs: u64,

    /// Base URL of the synonym reference site. The page at `{url}/{word}` is
    /// given to the model as context. Set to an empty string to disable.
    ///
    /// Environment variable: `REFERENCE_URL`
    #[arg(long, env = "REFERENCE_URL", default_value_t = String::from("https://www.synonymer.se/sv-syn"))]
    pub reference_url: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub worker: WorkerConfig,
    pub store_path: Option<PathBuf>,
    pub ollama: OllamaConfig,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.scan_base_secs == 0 {
            bail!("SCAN_BASE_SECS must be greater than 0");
        }

        if args.scan_retry_secs == 0 {
            bail!("SCAN_RETRY_SECS must be greater than 0");
        }

        if args.scan_base_secs > args.scan_max_secs {
            bail!(
                "SCAN_BASE_SECS ({}) exceeds SCAN_MAX_SECS ({})",
                args.scan_base_secs,
                args.scan_max_secs
            );
        }

        if args.backend_timeout_secs == 0 {
            bail!("BACKEND_TIMEOUT_SECS must be greater than 0");
        }

        let ollama_host = args.ollama_host.trim_end_matches('/').to_string();
        if !ollama_host.starts_with("http://") && !ollama_host.starts_with("https://") {
            bail!("OLLAMA_HOST must be an http(s) URL, got {ollama_host:?}");
        }

        let reference_url = match args.reference_url.trim() {
            "" => None,
            raw => {
                let url = Url::parse(raw)
                    .with_context(|| format!("REFERENCE_URL is not a valid URL: {raw:?}"))?;
                if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
                    bail!("REFERENCE_URL must be an http(s) URL, got {raw:?}");
                }
                Some(url)
            }
        };

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            worker: WorkerConfig {
                num_dispatchers: args.num_workers,
                cooldown: Duration::from_secs(args.cooldown_secs),
                scan: ScanPolicy {
                    base: Duration::from_secs(args.scan_base_secs),
                    ceiling: Duration::from_secs(args.scan_max_secs),
                    retry_delay: Duration::from_secs(args.scan_retry_secs),
                    ..ScanPolicy::default()
                },
                shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            },
            store_path: args.store_path,
            ollama: OllamaConfig {
                host: ollama_host,
                model: args.ollama_model,
                timeout: Duration::from_secs(args.backend_timeout_secs),
                reference_url,
            },
        })
    }
}
