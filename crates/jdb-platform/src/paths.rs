use std::path::{Path, PathBuf};

use crate::error::PlatformError;

const APP_DIR: &str = "jdb";

/// Standard per-user locations.
pub trait PlatformPaths: Send + Sync {
    /// `~/.config/jdb`
    fn config_dir(&self) -> PathBuf;
    /// `~/.local/share/jdb`
    fn data_dir(&self) -> PathBuf;
    /// `<data_dir>/logs`
    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
    /// `<log_dir>/jdb.log`
    fn default_log_file(&self) -> PathBuf {
        self.log_dir().join("jdb.log")
    }
}

/// [`PlatformPaths`] rooted at the user's home directory.
pub struct DefaultPaths {
    home: PathBuf,
}

impl DefaultPaths {
    /// Resolve the home directory.
    ///
    /// # Errors
    ///
    /// `PlatformError::Path` when neither `dirs` nor `HOME` yield one.
    pub fn new() -> Result<Self, PlatformError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .ok_or_else(|| PlatformError::Path("could not determine home directory".into()))?;
        Ok(Self { home })
    }

    /// Paths under an explicit home, for tests and sandboxes.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}

impl PlatformPaths for DefaultPaths {
    fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join(APP_DIR)
    }

    fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join(APP_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_explicit_home() {
        let paths = DefaultPaths::with_home("/home/dev");
        assert_eq!(paths.config_dir(), PathBuf::from("/home/dev/.config/jdb"));
        assert_eq!(paths.data_dir(), PathBuf::from("/home/dev/.local/share/jdb"));
        assert_eq!(paths.log_dir(), PathBuf::from("/home/dev/.local/share/jdb/logs"));
        assert_eq!(
            paths.default_log_file(),
            PathBuf::from("/home/dev/.local/share/jdb/logs/jdb.log")
        );
        assert_eq!(paths.home(), Path::new("/home/dev"));
    }

    #[test]
    fn resolved_home_is_absolute() {
        let paths = DefaultPaths::new().expect("should resolve home directory");
        assert!(paths.home().is_absolute());
        assert!(paths.config_dir().ends_with(".config/jdb"));
    }

    #[test]
    fn default_paths_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DefaultPaths>();
    }
}
