//!
//! fleetwatch configuration
//! ------------------------
//! Settings are layered: built-in defaults, then an optional JSON file
//! (`--config PATH` or `FLEETWATCH_CONFIG`), then `FLEETWATCH_*` environment
//! variables, then command-line flags. A value that fails to parse in one layer
//! is ignored and the lower layer's value stands.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 5000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hosted backend base URL; with `anon_key` selects the REST backend.
    pub backend_url: Option<String>,
    pub anon_key: Option<String>,
    /// Feed page size used by the shell.
    pub page_size: u32,
    /// How long the shell waits for the auth context to settle.
    pub settle_timeout_ms: u64,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Seed a default admin into the in-memory backend.
    pub seed_admin: bool,
    /// Ignore any backend URL and run in memory.
    #[serde(skip)]
    pub force_memory: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            anon_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
            log_filter: "info".to_string(),
            seed_admin: true,
            force_memory: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Memory,
    Remote,
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool { args.iter().any(|a| a == flag) }

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Load from the process environment and the given command-line arguments.
    pub fn load(args: &[String]) -> Result<Self> { Self::load_with(args, |k| env::var(k).ok()) }

    /// Same as `load`, reading variables through `lookup`.
    pub fn load_with<F>(args: &[String], lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = arg_value(args, "--config").map(PathBuf::from).or_else(|| lookup("FLEETWATCH_CONFIG").map(PathBuf::from));
        let mut cfg = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_env(&lookup);
        cfg.apply_args(args);
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: &F) {
        if let Some(v) = lookup("FLEETWATCH_BACKEND_URL") { self.backend_url = Some(v); }
        if let Some(v) = lookup("FLEETWATCH_ANON_KEY") { self.anon_key = Some(v); }
        if let Some(v) = lookup("FLEETWATCH_PAGE_SIZE").and_then(|v| v.trim().parse().ok()) { self.page_size = v; }
        if let Some(v) = lookup("FLEETWATCH_SETTLE_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) { self.settle_timeout_ms = v; }
        if let Some(v) = lookup("FLEETWATCH_LOG") { self.log_filter = v; }
        if let Some(v) = lookup("FLEETWATCH_SEED_ADMIN").and_then(|v| parse_bool(&v)) { self.seed_admin = v; }
    }

    fn apply_args(&mut self, args: &[String]) {
        if let Some(v) = arg_value(args, "--backend-url") { self.backend_url = Some(v.to_string()); }
        if let Some(v) = arg_value(args, "--anon-key") { self.anon_key = Some(v.to_string()); }
        if let Some(v) = arg_value(args, "--page-size").and_then(|v| v.parse().ok()) { self.page_size = v; }
        if let Some(v) = arg_value(args, "--settle-timeout-ms").and_then(|v| v.parse().ok()) { self.settle_timeout_ms = v; }
        if let Some(v) = arg_value(args, "--log") { self.log_filter = v.to_string(); }
        if has_flag(args, "--memory") { self.force_memory = true; }
        if has_flag(args, "--no-seed-admin") { self.seed_admin = false; }
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("page_size must be at least 1");
        }
        if self.backend_url.is_some() != self.anon_key.is_some() && !self.force_memory {
            tracing::warn!(target: "fleetwatch::startup", "backend_url and anon_key must both be set; using the in-memory backend");
        }
        Ok(())
    }

    pub fn backend_mode(&self) -> BackendMode {
        match (&self.backend_url, &self.anon_key, self.force_memory) {
            (Some(_), Some(_), false) => BackendMode::Remote,
            _ => BackendMode::Memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn args(list: &[&str]) -> Vec<String> { list.iter().map(|s| s.to_string()).collect() }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_select_memory_backend() {
        let cfg = Config::load_with(&[], env_of(&[])).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.page_size, 10);
        assert_eq!(cfg.backend_mode(), BackendMode::Memory);
    }

    #[test]
    fn env_overrides_file_and_flags_override_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"page_size": 25, "log_filter": "debug", "backend_url": "https://file.example"}}"#).unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cfg = Config::load_with(
            &args(&["fleetwatch", "--config", &path, "--page-size", "7"]),
            env_of(&[("FLEETWATCH_PAGE_SIZE", "15"), ("FLEETWATCH_ANON_KEY", "anon"), ("FLEETWATCH_LOG", "warn")]),
        )
        .unwrap();
        assert_eq!(cfg.page_size, 7);
        assert_eq!(cfg.log_filter, "warn");
        assert_eq!(cfg.backend_url.as_deref(), Some("https://file.example"));
        assert_eq!(cfg.backend_mode(), BackendMode::Remote);
    }

    #[test]
    fn config_file_from_environment_variable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"seed_admin": false}}"#).unwrap();
        let path = file.path().to_string_lossy().to_string();
        let cfg = Config::load_with(&[], env_of(&[("FLEETWATCH_CONFIG", path.as_str())])).unwrap();
        assert!(!cfg.seed_admin);
        assert_eq!(cfg.settle_timeout_ms, DEFAULT_SETTLE_TIMEOUT_MS);
    }

    #[test]
    fn unparsable_values_fall_back_to_lower_layer() {
        let cfg = Config::load_with(
            &args(&["fleetwatch", "--page-size", "lots"]),
            env_of(&[("FLEETWATCH_PAGE_SIZE", "12"), ("FLEETWATCH_SEED_ADMIN", "maybe")]),
        )
        .unwrap();
        assert_eq!(cfg.page_size, 12);
        assert!(cfg.seed_admin);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert!(Config::load_with(&args(&["fleetwatch", "--page-size", "0"]), env_of(&[])).is_err());
    }

    #[test]
    fn memory_flag_wins_over_backend_settings() {
        let cfg = Config::load_with(
            &args(&["fleetwatch", "--backend-url", "https://x.example", "--anon-key", "k", "--memory", "--no-seed-admin"]),
            env_of(&[]),
        )
        .unwrap();
        assert_eq!(cfg.backend_mode(), BackendMode::Memory);
        assert!(!cfg.seed_admin);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json").to_string_lossy().to_string();
        assert!(Config::load_with(&args(&["fleetwatch", "--config", &missing]), env_of(&[])).is_err());
    }
}
