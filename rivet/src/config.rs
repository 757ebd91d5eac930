#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use crate::TranslateOptions;

pub const CONFIG_FILE: &str = "rivet.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(rivet::config))]
pub struct ConfigError {
    pub message: String,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct ConfigFile {
    #[serde(default)]
    translate: Option<TranslateOptions>,
}

/// Nearest `rivet.toml` in `start` (or its directory, for a file) or any
/// ancestor.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let dir = if start.is_file() { start.parent()? } else { start };
    dir.ancestors()
        .map(|d| d.join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

/// Read the `[translate]` table of a config file. A file without one yields
/// the defaults.
pub fn load_options(path: &Path) -> Result<TranslateOptions, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|e| ConfigError {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_options(&raw).map_err(|message| ConfigError {
        message: format!("failed to parse {}: {message}", path.display()),
    })
}

fn parse_options(raw: &str) -> Result<TranslateOptions, String> {
    let parsed: ConfigFile = toml::from_str(raw).map_err(|e| e.to_string())?;
    let options = parsed.translate.unwrap_or_default();
    if options.max_fixpoint_iterations == 0 {
        return Err("`max_fixpoint_iterations` must be at least 1".to_string());
    }
    Ok(options)
}
