use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use termdrill_common::{EngineInfo, RunInfo};
use tracing::{debug, info};

use crate::error::{Result, SandboxError};
use crate::runner::{CommandRunner, Invocation};

/// Program + args to exec interactively for the learner's session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellCommand {
    /// Display form, quoting arguments that contain whitespace
    pub fn to_command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|arg| {
                if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('\'') {
                    format!("'{}'", arg.replace('\'', r"'\''"))
                } else {
                    arg.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Live handle to one provisioned sandbox.
///
/// Owned by the `Provisioner`; other components get a `SandboxView`.
/// Lifecycle is Start -> used -> Stop, and a stopped handle exposes no shell.
pub struct SandboxHandle {
    pub(crate) engine: EngineInfo,
    pub(crate) session_id: String,
    pub(crate) pack_id: String,
    pub(crate) level_id: String,
    pub(crate) container_name: Option<String>,
    pub(crate) image: Option<String>,
    pub(crate) workdir: PathBuf,
    pub(crate) container_workdir: String,
    pub(crate) cwd: String,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) shell: Option<ShellCommand>,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) timeout: Duration,
    pub(crate) stopped: bool,
}

impl std::fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("engine", &self.engine.name)
            .field("container_name", &self.container_name)
            .field("workdir", &self.workdir)
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl SandboxHandle {
    pub fn is_mock(&self) -> bool {
        self.engine.is_mock()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Command to exec interactively; `None` for mock sandboxes (callers use
    /// recorded playback instead) and once the handle is stopped
    pub fn shell_command(&self) -> Option<&ShellCommand> {
        if self.stopped {
            return None;
        }
        self.shell.as_ref()
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn container_name(&self) -> Option<&str> {
        self.container_name.as_deref()
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn engine(&self) -> &EngineInfo {
        &self.engine
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn view(&self) -> SandboxView {
        SandboxView {
            engine: self.engine.clone(),
            pack_id: self.pack_id.clone(),
            level_id: self.level_id.clone(),
            container_name: self.container_name.clone(),
            image: self.image.clone(),
            workdir: self.workdir.clone(),
            container_workdir: self.container_workdir.clone(),
        }
    }

    /// Force-remove the container. Idempotent; a no-op for mock or
    /// name-less handles. A failed removal leaves the handle live so the
    /// caller can retry.
    pub async fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        let name = match (&self.container_name, self.is_mock()) {
            (Some(name), false) => name.clone(),
            _ => {
                self.stopped = true;
                return Ok(());
            }
        };

        let invocation =
            Invocation::new(self.engine.name.clone(), ["rm", "-f", name.as_str()]).with_timeout(self.timeout);
        let output = self.runner.run(&invocation).await?;
        if !output.success() {
            let text = output.combined();
            if text.to_lowercase().contains("no such container") {
                debug!(container = %name, "Container already gone");
            } else {
                return Err(SandboxError::Removal { name, output: text });
            }
        }

        info!(container = %name, "Sandbox stopped");
        self.stopped = true;
        Ok(())
    }
}

/// Read-only snapshot of a sandbox, handed to grading
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxView {
    engine: EngineInfo,
    pack_id: String,
    level_id: String,
    container_name: Option<String>,
    image: Option<String>,
    workdir: PathBuf,
    container_workdir: String,
}

impl SandboxView {
    pub fn engine(&self) -> &EngineInfo {
        &self.engine
    }

    pub fn container_name(&self) -> Option<&str> {
        self.container_name.as_deref()
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn container_workdir(&self) -> &str {
        &self.container_workdir
    }

    pub fn is_mock(&self) -> bool {
        self.engine.is_mock()
    }

    /// Run identity for a grading request against this sandbox
    pub fn run_info(&self, run_id: impl Into<String>, attempt: u32, started_at: DateTime<Utc>) -> RunInfo {
        RunInfo {
            pack_id: self.pack_id.clone(),
            level_id: self.level_id.clone(),
            run_id: run_id.into(),
            attempt,
            started_at,
            finished_at: None,
            engine: self.engine.name.clone(),
            container_name: self.container_name.clone(),
            image: self.image.clone(),
            workdir: self.workdir.clone(),
            container_workdir: self.container_workdir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quoting() {
        let cmd = ShellCommand {
            program: "docker".to_string(),
            args: vec![
                "exec".to_string(),
                "-e".to_string(),
                "PS1=my prompt".to_string(),
                "it's".to_string(),
            ],
        };
        assert_eq!(
            cmd.to_command_line(),
            r"docker exec -e 'PS1=my prompt' 'it'\''s'"
        );
    }
}
