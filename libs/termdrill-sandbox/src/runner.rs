//! External process boundary
//!
//! Every engine operation is expressed as an `Invocation` (program + args),
//! handed to a `CommandRunner`, and its `CommandOutput` parsed by the caller.
//! The production runner spawns real processes; tests swap in a scripted one.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, SandboxError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// First argument, i.e. the engine subcommand (`run`, `rm`, ...)
    pub fn action(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }
}

/// Captured result of one external process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal or timed out
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }

    /// stdout and stderr joined and trimmed, for error messages
    pub fn combined(&self) -> String {
        let mut text = String::new();
        text.push_str(self.stdout.trim());
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr);
        }
        if self.timed_out {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str("(timed out)");
        }
        text
    }
}

/// Runs one invocation to completion.
///
/// Implementations must honour `Invocation::timeout` by reporting
/// `timed_out = true` rather than failing, and must kill the process if the
/// returned future is dropped.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Spawns real processes via tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        ProcessRunner
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }

        debug!(
            program = %invocation.program,
            action = invocation.action(),
            timeout_ms = invocation.timeout.as_millis() as u64,
            "Spawning external command"
        );

        let child = cmd.spawn().map_err(|source| SandboxError::Command {
            program: invocation.program.clone(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                status: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
            }),
            Ok(Err(source)) => Err(SandboxError::Command {
                program: invocation.program.clone(),
                source,
            }),
            Err(_) => {
                warn!(
                    program = %invocation.program,
                    action = invocation.action(),
                    "External command timed out, killed"
                );
                Ok(CommandOutput {
                    timed_out: true,
                    ..Default::default()
                })
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output_trimmed() {
        let output = CommandOutput {
            status: Some(125),
            stdout: "\n".to_string(),
            stderr: "  Error: image not found \n".to_string(),
            timed_out: false,
        };
        assert!(!output.success());
        assert_eq!(output.combined(), "Error: image not found");
    }

    #[test]
    fn test_invocation_action() {
        let inv = Invocation::new("docker", ["rm", "-f", "x"]);
        assert_eq!(inv.action(), "rm");
        assert_eq!(inv.timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_process_runner_captures_output() {
        let runner = ProcessRunner::new();
        let inv = Invocation::new("sh", ["-c", "printf hi; printf err >&2; exit 3"]);
        let output = runner.run(&inv).await.unwrap();

        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout, "hi");
        assert_eq!(output.stderr, "err");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_process_runner_times_out() {
        let runner = ProcessRunner::new();
        let inv = Invocation::new("sh", ["-c", "sleep 5"]).with_timeout(Duration::from_millis(100));
        let output = runner.run(&inv).await.unwrap();

        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_process_runner_missing_binary() {
        let runner = ProcessRunner::new();
        let inv = Invocation::new("termdrill-no-such-binary", Vec::<String>::new());
        let err = runner.run(&inv).await.unwrap_err();
        assert!(matches!(err, SandboxError::Command { .. }));
    }

    #[tokio::test]
    async fn test_process_runner_uses_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let runner = ProcessRunner::new();
        let inv = Invocation::new("cat", ["marker.txt"]).with_cwd(dir.path());
        let output = runner.run(&inv).await.unwrap();
        assert_eq!(output.stdout, "here");
    }
}
