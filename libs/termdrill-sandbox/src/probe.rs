//! Engine Probe
//!
//! `Unconfigured -> Detecting -> {Detected(engine), Unavailable}`
//!
//! Priority: mock mode, then a forced engine name, then an explicit
//! docker/podman mode, then auto (podman first, docker second).
//! An engine is usable when its binary is on PATH and `<engine> info` exits 0.

use std::sync::Arc;
use std::time::Duration;
use termdrill_common::naming::MOCK_ENGINE;
use termdrill_common::{EngineInfo, EngineMode};
use tracing::{debug, info, warn};

use crate::engine::{auto_order, engine_for, ContainerEngine, DOCKER, PODMAN};
use crate::error::{Result, SandboxError};
use crate::runner::{CommandRunner, Invocation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeState {
    Unconfigured,
    Detecting,
    Detected(EngineInfo),
    Unavailable(String),
}

type Locator = Box<dyn Fn(&str) -> bool + Send + Sync>;

pub struct EngineProbe {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    locate: Locator,
    state: ProbeState,
}

impl EngineProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            runner,
            timeout,
            locate: Box::new(|name| which::which(name).is_ok()),
            state: ProbeState::Unconfigured,
        }
    }

    /// Replace the PATH lookup (for testing)
    pub fn with_locator(mut self, locate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.locate = Box::new(locate);
        self
    }

    pub fn state(&self) -> &ProbeState {
        &self.state
    }

    /// Detect the engine to use and record the outcome in `state`
    pub async fn detect(&mut self, mode: EngineMode, force: Option<&str>) -> Result<EngineInfo> {
        self.state = ProbeState::Detecting;
        let outcome = self.resolve(mode, force).await;
        self.state = match &outcome {
            Ok(engine) => {
                info!(engine = %engine.name, version = %engine.version, "Container engine detected");
                ProbeState::Detected(engine.clone())
            }
            Err(e) => {
                warn!(error = %e, "No container engine available");
                ProbeState::Unavailable(e.to_string())
            }
        };
        outcome
    }

    async fn resolve(&self, mode: EngineMode, force: Option<&str>) -> Result<EngineInfo> {
        if mode == EngineMode::Mock {
            return Ok(EngineInfo::mock());
        }

        if let Some(name) = force.map(str::trim).filter(|n| !n.is_empty()) {
            if name == MOCK_ENGINE {
                return Ok(EngineInfo::mock());
            }
            let engine =
                engine_for(name).ok_or_else(|| SandboxError::UnsupportedEngine(name.to_string()))?;
            return self.validate(engine).await;
        }

        match mode {
            EngineMode::Mock => Ok(EngineInfo::mock()),
            EngineMode::Docker => self.validate(&DOCKER).await,
            EngineMode::Podman => self.validate(&PODMAN).await,
            EngineMode::Auto => {
                // Only the most recent failure is reported.
                let mut last_error = String::new();
                for engine in auto_order() {
                    match self.validate(engine).await {
                        Ok(info) => return Ok(info),
                        Err(e) => {
                            debug!(engine = engine.name(), error = %e, "Engine probe failed");
                            last_error = e.to_string();
                        }
                    }
                }
                Err(SandboxError::EngineUnavailable(format!(
                    "neither podman nor docker is usable ({})",
                    last_error
                )))
            }
        }
    }

    async fn validate(&self, engine: &dyn ContainerEngine) -> Result<EngineInfo> {
        let name = engine.name();
        if !(self.locate)(name) {
            return Err(SandboxError::EngineUnavailable(format!(
                "{} not found on PATH",
                name
            )));
        }

        let health = self
            .runner
            .run(&Invocation::new(name, ["info"]).with_timeout(self.timeout))
            .await?;
        if !health.success() {
            return Err(SandboxError::EngineUnavailable(format!(
                "`{} info` failed: {}",
                name,
                health.combined()
            )));
        }

        let version = match self
            .runner
            .run(&Invocation::new(name, ["--version"]).with_timeout(self.timeout))
            .await
        {
            Ok(output) if output.success() => parse_version(&output.stdout),
            _ => None,
        };

        Ok(EngineInfo {
            name: name.to_string(),
            version: version.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

/// Pull the version out of `Docker version 24.0.7, build afdd53b` or
/// `podman version 4.9.3`
pub fn parse_version(output: &str) -> Option<String> {
    let mut words = output.split_whitespace();
    while let Some(word) = words.next() {
        if word.eq_ignore_ascii_case("version") {
            return words
                .next()
                .map(|v| v.trim_end_matches(',').to_string())
                .filter(|v| !v.is_empty());
        }
    }
    None
}
