//! Per-user directories and log file housekeeping for jdb.

pub mod error;
pub mod logging;
pub mod paths;

pub use error::PlatformError;
pub use logging::{prepare_log_file, rotate_log_files, MAX_LOG_FILES, MAX_LOG_SIZE};
pub use paths::{DefaultPaths, PlatformPaths};
