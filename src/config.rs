// src/config.rs
//! Runtime configuration: assembly dialect, shot counts, simulator
//! seed. Loaded from an explicit path or `~/.arqon/config.toml`,
//! falling back to built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::qasm;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub dialect: Dialect,
    pub shots: Shots,
    /// Seed for the local simulator's shot sampling. Unset means
    /// deterministic apportionment.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Dialect {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Shots {
    pub read: u32,
    pub statement: u32,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect { name: "openqasm".to_string(), version: "2.0".to_string() }
    }
}

impl Default for Shots {
    fn default() -> Self {
        Shots { read: qasm::READ_SHOTS, statement: qasm::STMT_SHOTS }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dialect: Dialect::default(),
            shots: Shots::default(),
            seed: None,
        }
    }
}

impl Config {
    pub fn from_toml_file(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Config = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    fn user_default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|h| h.join(".arqon").join("config.toml"))
    }

    /// Explicit path if given, otherwise the user default when it
    /// exists, otherwise built-ins.
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        if let Some(path) = explicit {
            return Config::from_toml_file(path);
        }
        match Config::user_default_path() {
            Some(path) if path.exists() => Config::from_toml_file(&path),
            _ => Ok(Config::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shot_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.shots.read, 2048);
        assert_eq!(cfg.shots.statement, 1024);
        assert_eq!(cfg.dialect.name, "openqasm");
        assert_eq!(cfg.seed, None);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str("seed = 9\n[shots]\nread = 64\n").unwrap();
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.shots.read, 64);
        assert_eq!(cfg.shots.statement, 1024);
        assert_eq!(cfg.dialect.version, "2.0");
    }
}
