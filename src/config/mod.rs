//! Configuration module for codesearch-rs
//!
//! Handles loading and validating settings from YAML files and environment variables.

mod settings;

pub use settings::*;

use crate::error::Result;
use std::path::PathBuf;
use tracing::info;

/// Candidate settings locations, in lookup order
pub fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("config.yml"),
        PathBuf::from("config/config.yml"),
    ];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("codesearch-rs/config.yml"));
    }
    paths
}

/// Load settings from an explicit file, `CODESEARCH_SETTINGS_PATH`, or the
/// first existing default path, then apply environment overrides and validate.
pub fn load(explicit: Option<PathBuf>) -> Result<Settings> {
    let env_path = std::env::var("CODESEARCH_SETTINGS_PATH")
        .ok()
        .map(PathBuf::from);

    let path = explicit
        .or(env_path)
        .or_else(|| default_paths().into_iter().find(|p| p.exists()));

    let mut settings = match path {
        Some(path) => {
            info!("Loading settings from: {}", path.display());
            Settings::from_file(&path)?
        }
        None => {
            info!("No settings file found, using defaults");
            Settings::default()
        }
    };

    settings.merge_env();
    settings.validate()?;
    Ok(settings)
}
