//! Configuration loading helpers
//!
//! Canopy services resolve configuration with ENV → TOML → compiled default
//! priority. This module provides the shared pieces: config file discovery,
//! typed TOML read/write, and environment variable parsing.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Locate the configuration file for a service.
///
/// **Priority:**
/// 1. `CANOPY_CONFIG` environment variable (explicit path)
/// 2. `~/.config/canopy/<service>.toml`
/// 3. `/etc/canopy/<service>.toml` (Linux only)
///
/// Returns `NotFound` if no file exists at any location.
pub fn config_file_path(service: &str) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CANOPY_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        return Err(Error::Config(format!(
            "CANOPY_CONFIG points to missing file: {}",
            path.display()
        )));
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("canopy").join(format!("{}.toml", service))) {
        if user_config.exists() {
            return Ok(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from(format!("/etc/canopy/{}.toml", service));
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::NotFound(format!("No config file found for {}", service)))
}

/// Read and parse a TOML config file into a typed structure.
pub fn read_toml_config<T: DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write a configuration structure to a TOML file atomically
/// (write to `<path>.tmp`, then rename).
pub fn write_toml_config<T: Serialize>(config: &T, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Create config dir failed: {}", e)))?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)
        .map_err(|e| Error::Config(format!("Write TOML failed: {}", e)))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| Error::Config(format!("Rename TOML failed: {}", e)))?;

    Ok(())
}

/// Parse an environment variable into a typed value.
///
/// Returns `None` when the variable is unset; `Config` error when it is
/// set but does not parse (a misconfiguration must never silently fall
/// back to a default).
pub fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value for {}: {:?}", name, raw))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::Config(format!("Cannot read {}: {}", name, e))),
    }
}
