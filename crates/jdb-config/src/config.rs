use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Every frame in and out.
    Trace,
    /// Per-frame traffic.
    Debug,
    /// Breakpoints, stops and connection milestones (default).
    #[default]
    Info,
    /// Recoverable anomalies only.
    Warn,
    /// Connection aborts only.
    Error,
}

impl LogLevel {
    /// Level name as understood by tracing filters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Where the debugger server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_true() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ConnectionConfig {
    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Override from a `host`, `host:port` or `:port` argument.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Validation`] when the port is not a number.
    pub fn apply_address(&mut self, address: &str) -> Result<(), ConfigError> {
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| ConfigError::Validation {
                    field: "connection.port".to_string(),
                    message: format!("invalid port {port:?}"),
                })?;
                (host, Some(port))
            }
            None => (address, None),
        };
        if !host.is_empty() {
            self.host = host.to_string();
        }
        if let Some(port) = port {
            self.port = port;
        }
        Ok(())
    }
}

/// Debugger behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebuggerConfig {
    /// Request a backtrace after every stop.
    #[serde(default = "default_true")]
    pub backtrace_on_stop: bool,
    /// Depth of automatic backtraces (0 = unlimited).
    #[serde(default)]
    pub backtrace_depth: u32,
    /// Breakpoint specs queued as pending on every connection.
    #[serde(default)]
    pub breakpoints: Vec<String>,
    /// Send an exception-config message once connected.
    #[serde(default)]
    pub stop_at_exception: Option<bool>,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            backtrace_on_stop: true,
            backtrace_depth: 0,
            breakpoints: Vec::new(),
            stop_at_exception: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
}

/// Top-level jdb configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub debugger: DebuggerConfig,
    #[serde(default)]
    pub log: LogConfig,
}
