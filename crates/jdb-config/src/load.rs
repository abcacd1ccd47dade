use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::{first_error, validate};

/// Written to `config.toml` the first time jdb runs.
const DEFAULT_CONFIG_CONTENT: &str = r#"# jdb configuration
# Uncomment and edit settings below to override defaults.

# [connection]
# host = "localhost"
# port = 5001

# [debugger]
# backtrace_on_stop = true
# backtrace_depth = 0
# breakpoints = ["main.js:10", "init"]
# stop_at_exception = true

# [log]
# level = "info"
# file = "/tmp/jdb.log"
"#;

/// Directory searched for project overrides.
const PROJECT_DIR: &str = ".jdb";

/// Load the global config from `config_dir`, then layer the nearest
/// `.jdb/config.toml` found from `project_dir` upward.
///
/// A missing global file is created with commented-out defaults.
///
/// # Errors
///
/// I/O, parse and the first validation failure.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !global_path.exists() {
        std::fs::create_dir_all(config_dir)?;
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!(path = %global_path.display(), "created default config");
    }

    let mut config = Config::default();
    let global = std::fs::read_to_string(&global_path)?;
    if has_settings(&global) {
        config = merge_configs(&config, &global)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!(path = %project_path.display(), "applying project config");
        let project = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project)?;
    }

    first_error(validate(&config))?;
    Ok(config)
}

/// Nearest `.jdb/config.toml` at or above `start`.
pub fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_DIR).join("config.toml"))
        .find(|candidate| candidate.is_file())
}

fn has_settings(content: &str) -> bool {
    content.lines().map(str::trim).any(|l| !l.is_empty() && !l.starts_with('#'))
}

/// Parse and validate a config without touching the filesystem.
///
/// # Errors
///
/// Parse and the first validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    first_error(validate(&config))?;
    Ok(config)
}
