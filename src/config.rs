use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::overlay::BoxFormat;

pub const DEFAULT_CONFIG_FILE_PATH: &str = "annotate-json.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder searched by file name when an image path does not exist.
    pub image_prefix: Option<PathBuf>,
    /// Format given to newly discovered overlay fields.
    pub default_format: BoxFormat,
    pub window_width: f32,
    pub window_height: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            image_prefix: None,
            default_format: BoxFormat::default(),
            window_width: 1000.0,
            window_height: 700.0,
        }
    }
}

impl Settings {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings = toml::from_str(&s)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Missing files give the defaults; broken ones are logged and also give
    /// the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(settings) => settings,
            Err(e) => {
                error!("{:#}", e);
                Self::default()
            }
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = toml::to_string_pretty(self).context("Failed to serialize Settings to TOML")?;
        std::fs::write(path, s)?;
        Ok(())
    }
}
