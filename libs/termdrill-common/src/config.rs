use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::EngineMode;

pub const DEFAULT_RCFILE: &str = "/opt/termdrill/bashrc";

/// Application configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub engine_mode: EngineMode,
    pub force_engine: Option<String>,
    pub probe_timeout_ms: u64,
    pub engine_timeout_ms: u64,
    pub check_timeout_ms: u64,
    pub artifacts_dir: Option<PathBuf>,
    pub rcfile: String,
}

fn env_ms(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            engine_mode: env_non_empty("TERMDRILL_ENGINE")
                .and_then(|v| EngineMode::parse(&v))
                .unwrap_or(EngineMode::Auto),
            force_engine: env_non_empty("TERMDRILL_FORCE_ENGINE"),
            probe_timeout_ms: env_ms("TERMDRILL_PROBE_TIMEOUT_MS", 10_000),
            engine_timeout_ms: env_ms("TERMDRILL_ENGINE_TIMEOUT_MS", 60_000),
            check_timeout_ms: env_ms("TERMDRILL_CHECK_TIMEOUT_MS", 3_000),
            artifacts_dir: env_non_empty("TERMDRILL_ARTIFACTS_DIR").map(PathBuf::from),
            rcfile: env_non_empty("TERMDRILL_RCFILE").unwrap_or_else(|| DEFAULT_RCFILE.to_string()),
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
