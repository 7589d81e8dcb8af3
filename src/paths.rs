//! Application path management for portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Dev mode** (debug builds): `config.yaml` in the current directory wins.
//! - **Portable mode**: a `.portable` marker next to the executable keeps the
//!   config and profile in the same directory.
//! - **Installed mode** (default): files live in the platform config dir
//!   (`%APPDATA%\Input Override`, `~/.config/input-override`, ...).

use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
#[cfg(windows)]
const APP_NAME: &str = "Input Override";
#[cfg(not(windows))]
const APP_NAME: &str = "input-override";

const CONFIG_FILE: &str = "config.yaml";
const PROFILE_FILE: &str = "profile.yaml";

/// Resolved locations of the config and bindings profile
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Default bindings profile, used when the config names none
    pub profile: PathBuf,
    /// Whether files live next to the executable (or in cwd in dev mode)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join(CONFIG_FILE).exists() {
                eprintln!("[paths] Running in DEV mode ({} found in cwd)", CONFIG_FILE);
                return Self::in_dir(&cwd, true);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::in_dir(&exe_dir, true);
        }

        let base = dirs::config_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no platform config dir, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!("[paths] Running in INSTALLED mode ({})", base.display());

        Self::in_dir(&base, false)
    }

    /// Paths rooted in one directory
    pub fn in_dir(dir: &Path, is_portable: bool) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            profile: dir.join(PROFILE_FILE),
            is_portable,
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a path from the config relative to the config directory
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    /// Ensure the config directory exists
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        let base = self.base_dir();
        if !base.exists() {
            debug!("Creating config directory: {}", base.display());
            std::fs::create_dir_all(&base)?;
        }
        Ok(())
    }
}
