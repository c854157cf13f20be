//! Filesystem path management
//!
//! Resolves where the process's own state (settings file, catalog database,
//! jukebox file) lives, distinct from the user's configured library paths
//! (`paths.local`, `paths.cache`, ... in the settings file itself).

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static PATHS: OnceCell<Arc<Paths>> = OnceCell::new();

/// Manages the process's own on-disk state, as distinct from the library
/// paths recorded in the settings file.
#[derive(Debug, Clone)]
pub struct Paths {
    config_parent: PathBuf,
    config_dir: PathBuf,
}

impl Paths {
    /// Initialize the paths singleton. Idempotent: a second call returns the
    /// already-initialized instance.
    pub fn init(config_override: Option<PathBuf>) -> Result<Arc<Paths>> {
        let paths = PATHS.get_or_try_init(|| {
            let paths = Self::new(config_override)?;
            Ok::<_, anyhow::Error>(Arc::new(paths))
        })?;
        Ok(Arc::clone(paths))
    }

    /// Get the global paths instance.
    pub fn get() -> Result<Arc<Paths>> {
        PATHS.get().map(Arc::clone).context("Paths not initialized")
    }

    fn new(config_override: Option<PathBuf>) -> Result<Self> {
        let config_parent = if let Some(path) = config_override {
            path
        } else if let Ok(exe) = std::env::current_exe() {
            exe.parent().unwrap_or(Path::new(".")).to_path_buf()
        } else {
            directories::ProjectDirs::from("", "", "musicsim")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        };

        let config_dir_name = if is_home_dir(&config_parent) {
            ".musicsim"
        } else {
            "musicsim"
        };

        let config_dir = config_parent.join(config_dir_name);

        let paths = Self {
            config_parent,
            config_dir,
        };

        std::fs::create_dir_all(&paths.config_dir)?;
        Ok(paths)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_parent(&self) -> &Path {
        &self.config_parent
    }

    /// Default settings file path, used when `--config` is not given.
    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    /// Default location for the serialized timbre jukebox (§4.4), distinct
    /// from `paths.db`/`paths.cache` in the settings file since it is the
    /// process's own derived state, not user-configured library data.
    pub fn jukebox_path(&self) -> PathBuf {
        self.config_dir.join("musly.jukebox")
    }
}

fn is_home_dir(path: &Path) -> bool {
    directories::UserDirs::new()
        .map(|dirs| path.starts_with(dirs.home_dir()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_creation() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::new(Some(temp_dir.path().to_path_buf())).unwrap();
        assert!(paths.config_dir().exists());
    }
}
