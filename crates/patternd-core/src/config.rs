//! Configuration resolution for patternd.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/patternd/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Complete patternd configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub patterns: PatternSettings,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub log_level: String,
    pub log_json: bool,
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            log_json: false,
            max_body_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

/// How non-video URLs are turned into generator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Fetch over HTTP in-process and reduce HTML to visible text.
    #[default]
    InProcess,
    /// Spawn `fetch_bin` and pipe its stdout into the generator.
    External,
}

impl std::str::FromStr for FetchStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_process" | "in-process" => Ok(Self::InProcess),
            "external" => Ok(Self::External),
            other => Err(Error::Config(format!("Unknown fetch strategy: {other}"))),
        }
    }
}

/// Generator process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Path to the text-generation executable.
    pub generator_bin: PathBuf,
    pub fetch_strategy: FetchStrategy,
    /// Fetch tool used by [`FetchStrategy::External`].
    pub fetch_bin: PathBuf,
    pub fetch_timeout_secs: u64,
    pub max_fetch_bytes: usize,
    /// Ceiling for a single execution. Zero disables the ceiling.
    pub execution_timeout_secs: u64,
    /// Pattern name that implies a video transcript request.
    pub transcript_pattern: String,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            generator_bin: PathBuf::from("/fabric"),
            fetch_strategy: FetchStrategy::default(),
            fetch_bin: PathBuf::from("wget"),
            fetch_timeout_secs: 30,
            max_fetch_bytes: 5 * 1024 * 1024, // 5 MiB
            execution_timeout_secs: 600,
            transcript_pattern: "transcript".to_string(),
        }
    }
}

impl ExecutionSettings {
    /// The per-execution ceiling, `None` when disabled.
    pub const fn execution_timeout(&self) -> Option<Duration> {
        match self.execution_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Named pattern storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSettings {
    pub directory: PathBuf,
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            directory: dirs::home_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(".config")
                .join("fabric")
                .join("patterns"),
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            config = load_config_file(&global_path)?;
        }
    }

    // An explicitly requested file must exist.
    if let Some(path) = explicit {
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".patternd").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/patternd/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("patternd").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply `PATTERND_*` overrides. Values that fail to parse are ignored.
pub fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("PATTERND_ADDR") {
        if let Ok(addr) = val.parse() {
            config.server.addr = addr;
        }
    }
    if let Some(val) = var("PATTERND_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Some(val) = var("PATTERND_GENERATOR_BIN") {
        config.execution.generator_bin = PathBuf::from(val);
    }
    if let Some(val) = var("PATTERND_FETCH_STRATEGY") {
        if let Ok(strategy) = val.parse() {
            config.execution.fetch_strategy = strategy;
        }
    }
    if let Some(val) = var("PATTERND_FETCH_TIMEOUT") {
        if let Ok(secs) = val.parse() {
            config.execution.fetch_timeout_secs = secs;
        }
    }
    if let Some(val) = var("PATTERND_EXECUTION_TIMEOUT") {
        if let Ok(secs) = val.parse() {
            config.execution.execution_timeout_secs = secs;
        }
    }
    if let Some(val) = var("PATTERND_PATTERNS_DIR") {
        config.patterns.directory = PathBuf::from(val);
    }
}
