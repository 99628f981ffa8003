//! Shared setup for the termdb binaries.
use std::env;

use termdb_core::config::{resolve_with_base, Config, EngineConfig};

/// Logs go to stderr; `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Engine settings from `config.toml` / `APP_*`, with `--index <dir>` taking precedence.
pub fn engine_config(index_dir: Option<&str>) -> anyhow::Result<EngineConfig> {
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let mut engine = config.engine()?;
    if let Some(dir) = index_dir {
        engine.storage_dir = resolve_with_base(&env::current_dir()?, dir).to_string_lossy().into_owned();
    }
    Ok(engine)
}

/// Value following a flag, or exit with a usage error.
pub fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(v) => v,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

pub fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Error: {} requires a number", flag);
        std::process::exit(1);
    })
}
