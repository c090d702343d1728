//! Compiler configuration loading and parsing.
//!
//! Settings come from `katnipc.toml`: the working directory copy wins, then
//! the platform config dir. Unknown fields are ignored (TOML deserialization
//! tolerance) so the file format can grow without breaking older binaries,
//! and a file that fails to parse falls back to defaults rather than
//! aborting a compile over a config typo.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone)]
pub struct LayoutConfig {
    /// Horizontal tiling distance between stack origins.
    #[serde(default = "LayoutConfig::default_stack_spacing")]
    pub stack_spacing: f64,
    /// Gap between a block's right edge and its comment.
    #[serde(default = "LayoutConfig::default_comment_offset")]
    pub comment_offset: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            stack_spacing: Self::default_stack_spacing(),
            comment_offset: Self::default_comment_offset(),
        }
    }
}

impl LayoutConfig {
    const fn default_stack_spacing() -> f64 {
        600.0
    }
    const fn default_comment_offset() -> f64 {
        25.0
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct CatalogConfig {
    /// Permit `alias:` lines to shadow built-in commands.
    #[serde(default)]
    pub allow_alias_override: bool,
    /// Replace the embedded catalog with this file.
    #[serde(default)]
    pub commands_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

const CONFIG_FILE_NAME: &str = "katnipc.toml";

/// Where the effective settings came from. Compilations record this in their
/// startup telemetry so a surprising layout or catalog override is traceable
/// to a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// No readable config file was found (or it failed to parse); every
    /// setting is a built-in default.
    #[default]
    Defaults,
    /// Settings were parsed from this file.
    File(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: ConfigFile,
    pub source: ConfigSource,
}

/// Search the candidate locations for an existing `katnipc.toml`: a copy in
/// the working directory shadows the per-user one under the platform config
/// dir, so a project can pin its own layout constants.
pub fn discover() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("katnipc").join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}

/// Load settings from `path`, or from discovery when no explicit path is
/// given. Every failure mode degrades to defaults: a compile must not abort
/// over a missing or mistyped config file.
pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let Some(path) = path.or_else(discover) else {
        return Ok(Config::default());
    };
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            info!(
                target: "config",
                path = %path.display(),
                stack_spacing = file.layout.stack_spacing,
                allow_alias_override = file.catalog.allow_alias_override,
                "config_loaded"
            );
            Ok(Config {
                file,
                source: ConfigSource::File(path),
            })
        }
        Err(err) => {
            warn!(
                target: "config",
                path = %path.display(),
                error = %err,
                "config_parse_failed; using defaults"
            );
            Ok(Config::default())
        }
    }
}
