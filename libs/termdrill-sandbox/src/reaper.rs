//! Orphan Reaper
//!
//! Removes sandboxes left behind by crashed sessions. A container is an
//! orphan when it carries the session label and that label differs from the
//! active session id. Per-container failures are logged and skipped.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use termdrill_common::naming::LABEL_SESSION;
use termdrill_common::EngineInfo;
use tracing::{debug, info, warn};

use crate::error::{Result, SandboxError};
use crate::runner::{CommandRunner, CommandOutput, Invocation};

/// Outcome of one cleanup sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    pub removed: Vec<String>,
    /// Containers belonging to the active session
    pub skipped: Vec<String>,
    /// Containers that could not be inspected or removed
    pub failed: Vec<String>,
}

pub struct OrphanReaper {
    engine: EngineInfo,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl OrphanReaper {
    pub fn new(engine: EngineInfo, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            engine,
            runner,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Remove every labelled container not owned by `active_session`
    pub async fn cleanup_orphans(&self, active_session: &str) -> Result<ReapReport> {
        let mut report = ReapReport::default();
        if self.engine.is_mock() {
            return Ok(report);
        }

        let filter = format!("label={}", LABEL_SESSION);
        let listing = self
            .engine_command(["ps", "-a", "--filter", filter.as_str(), "--format", "{{.Names}}"])
            .await?;

        let names: Vec<String> = listing
            .stdout
            .lines()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();
        debug!(count = names.len(), "Labelled sandbox containers found");

        let session_template = format!("{{{{index .Config.Labels \"{}\"}}}}", LABEL_SESSION);
        for name in names {
            let owner = match self
                .engine_command(["inspect", "--format", session_template.as_str(), name.as_str()])
                .await
            {
                Ok(output) => output.stdout.trim().to_string(),
                Err(e) => {
                    warn!(container = %name, error = %e, "Failed to inspect container, skipping");
                    report.failed.push(name);
                    continue;
                }
            };

            if owner == active_session {
                report.skipped.push(name);
                continue;
            }

            match self.engine_command(["rm", "-f", name.as_str()]).await {
                Ok(_) => {
                    info!(container = %name, session = %owner, "Removed orphaned sandbox");
                    report.removed.push(name);
                }
                Err(e) => {
                    warn!(container = %name, error = %e, "Failed to remove orphaned sandbox");
                    report.failed.push(name);
                }
            }
        }

        Ok(report)
    }

    /// Run one engine subcommand, mapping a timeout or non-zero exit to an error
    async fn engine_command<const N: usize>(&self, args: [&str; N]) -> Result<CommandOutput> {
        let invocation = Invocation::new(self.engine.name.clone(), args).with_timeout(self.timeout);
        let output = self.runner.run(&invocation).await?;
        if output.timed_out {
            return Err(SandboxError::Timeout {
                program: invocation.program,
                timeout: self.timeout,
            });
        }
        if !output.success() {
            return Err(SandboxError::EngineCommand {
                program: invocation.program.clone(),
                action: invocation.action().to_string(),
                output: output.combined(),
            });
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::ScriptedRunner;

    fn podman() -> EngineInfo {
        EngineInfo {
            name: "podman".to_string(),
            version: "5.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_engine_is_noop() {
        let runner = Arc::new(ScriptedRunner::new());
        let reaper = OrphanReaper::new(EngineInfo::mock(), runner.clone());

        let report = reaper.cleanup_orphans("sess").await.unwrap();

        assert_eq!(report, ReapReport::default());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_removes_only_foreign_sessions() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .ok("termdrill-old-l1\ntermdrill-sess-l2\n\n")
                .ok("old\n")
                .ok("termdrill-old-l1\n")
                .ok("sess\n"),
        );
        let reaper = OrphanReaper::new(podman(), runner.clone());

        let report = reaper.cleanup_orphans("sess").await.unwrap();

        assert_eq!(report.removed, vec!["termdrill-old-l1".to_string()]);
        assert_eq!(report.skipped, vec!["termdrill-sess-l2".to_string()]);
        assert!(report.failed.is_empty());

        let calls = runner.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[0].args,
            vec!["ps", "-a", "--filter", "label=termdrill.session", "--format", "{{.Names}}"]
        );
        assert_eq!(
            calls[1].args,
            vec![
                "inspect",
                "--format",
                "{{index .Config.Labels \"termdrill.session\"}}",
                "termdrill-old-l1"
            ]
        );
        assert_eq!(calls[2].args, vec!["rm", "-f", "termdrill-old-l1"]);
        assert_eq!(calls[3].action(), "inspect");
    }

    #[tokio::test]
    async fn test_item_failures_do_not_abort() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .ok("a\nb\nc\n")
                .fail(1, "no such object")
                .ok("other")
                .fail(1, "device busy")
                .ok("other")
                .ok(""),
        );
        let reaper = OrphanReaper::new(podman(), runner.clone());

        let report = reaper.cleanup_orphans("sess").await.unwrap();

        assert_eq!(report.failed, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(report.removed, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        let runner = Arc::new(ScriptedRunner::new().fail(125, "cannot connect"));
        let reaper = OrphanReaper::new(podman(), runner);

        let err = reaper.cleanup_orphans("sess").await.unwrap_err();
        match err {
            SandboxError::EngineCommand { program, action, output } => {
                assert_eq!(program, "podman");
                assert_eq!(action, "ps");
                assert_eq!(output, "cannot connect");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_listing_timeout() {
        let runner = Arc::new(ScriptedRunner::new().push(Ok(CommandOutput {
            timed_out: true,
            ..Default::default()
        })));
        let reaper = OrphanReaper::new(podman(), runner).with_timeout(Duration::from_millis(5));

        let err = reaper.cleanup_orphans("sess").await.unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { .. }));
    }
}
