//! CLI entrypoint: `loader --config <file> --iglu-config <file>`.
//!
//! Exit codes match §6's CLI surface: 0 graceful, 1 runtime error, 2
//! configuration error. Argument parsing and config-file loading are
//! deliberately hand-rolled rather than pulled in from a CLI crate —
//! out of scope per §1 ("CLI parsing... out of scope"), matching the
//! teacher's own thin `main.rs`.

use rdb_loader::error::LoaderError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Args {
    config_path: String,
    iglu_config_path: String,
}

fn parse_args(raw: impl Iterator<Item = String>) -> Result<Args, LoaderError> {
    let mut config_path = None;
    let mut iglu_config_path = None;
    let mut args = raw;

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--config" => config_path = Some(args.next().ok_or_else(|| LoaderError::configuration("--config requires a value"))?),
            "--iglu-config" => {
                iglu_config_path = Some(args.next().ok_or_else(|| LoaderError::configuration("--iglu-config requires a value"))?)
            }
            other => return Err(LoaderError::configuration(format!("unrecognized argument: {other}"))),
        }
    }

    Ok(Args {
        config_path: config_path.ok_or_else(|| LoaderError::configuration("missing --config <file>"))?,
        iglu_config_path: iglu_config_path.ok_or_else(|| LoaderError::configuration("missing --iglu-config <file>"))?,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Loads and validates configuration, then hands off to the daemon.
/// Real warehouse/queue/storage/registry clients (§1, out of scope)
/// are the seam a deployment-specific build plugs in before calling
/// [`rdb_loader::dispatch::run_daemon`]; this binary validates
/// everything up to that seam and reports the gap explicitly rather
/// than silently no-opping.
async fn run() -> Result<(), LoaderError> {
    let args = parse_args(std::env::args().skip(1))?;
    init_tracing();

    let raw_config = std::fs::read_to_string(&args.config_path)
        .map_err(|e| LoaderError::configuration(format!("cannot read config file {}: {e}", args.config_path)))?;
    let config = rdb_loader::config::LoaderConfig::parse(&raw_config)?;

    std::fs::metadata(&args.iglu_config_path)
        .map_err(|e| LoaderError::configuration(format!("cannot read iglu config file {}: {e}", args.iglu_config_path)))?;

    tracing::info!(region = %config.region, queue = %config.message_queue, "configuration loaded and validated");

    Err(LoaderError::runtime(
        "no warehouse connection factory, message queue, object store, or schema registry client is wired into this \
         build; these collaborators are out of scope for this repository and are the seam a deployment binary supplies \
         to rdb_loader::dispatch::run_daemon",
    ))
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(0),
        Err(LoaderError::Configuration(message)) => {
            eprintln!("configuration error: {message}");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("runtime error: {e}");
            ExitCode::from(1)
        }
    }
}
