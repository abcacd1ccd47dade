mod console;
mod transport;

use std::env;
use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jdb_config::{load_config, Config};
use jdb_platform::{prepare_log_file, DefaultPaths, PlatformPaths};

use crate::console::Console;

const USAGE: &str = "usage: jdb [host[:port]]";

/// Send tracing output to `path` so it never interleaves with the console.
fn init_logging(path: &Path, level: &str) -> Result<()> {
    prepare_log_file(path)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load(paths: &DefaultPaths) -> Config {
    let project_dir = env::current_dir().ok();
    load_config(&paths.config_dir(), project_dir.as_deref()).unwrap_or_else(|e| {
        eprintln!("jdb: config load failed, using defaults: {e}");
        Config::default()
    })
}

fn run(address: Option<String>) -> Result<()> {
    let paths = DefaultPaths::new().context("failed to detect platform paths")?;
    let mut config = load(&paths);
    if let Some(address) = &address {
        config
            .connection
            .apply_address(address)
            .with_context(|| format!("invalid address {address:?}"))?;
    }

    let log_file = config
        .log
        .file
        .clone()
        .unwrap_or_else(|| paths.default_log_file());
    if let Err(e) = init_logging(&log_file, config.log.level.as_str()) {
        eprintln!("jdb: logging disabled: {e:#}");
    }
    info!(address = %config.connection.address(), "jdb starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let mut console = Console::new(config, std::io::stdout());
        console.connect(None).await?;
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        console.run(stdin).await
    })
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let address = match args.as_slice() {
        [] => None,
        [flag] if flag == "-h" || flag == "--help" => {
            println!("{USAGE}");
            return;
        }
        [address] => Some(address.clone()),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(address) {
        error!("fatal: {e:#}");
        eprintln!("jdb: {e:#}");
        std::process::exit(1);
    }
}
