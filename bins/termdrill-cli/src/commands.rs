// CLI commands driving the sandbox and grader libraries
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use termdrill_common::{Config, EngineInfo, EngineMode, GradingRequest, StartRequest};
use termdrill_grader::{mock_grade, Grader, GraderOptions};
use termdrill_sandbox::{CommandRunner, EngineProbe, OrphanReaper, ProcessRunner, Provisioner};
use tracing::{info, warn};
use uuid::Uuid;

use crate::report;
use crate::OutputFormat;

fn runner() -> Arc<dyn CommandRunner> {
    Arc::new(ProcessRunner::new())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn detect_engine(config: &Config, runner: Arc<dyn CommandRunner>) -> Result<EngineInfo> {
    let mut probe = EngineProbe::new(runner, config.probe_timeout());
    let engine = probe
        .detect(config.engine_mode, config.force_engine.as_deref())
        .await
        .context("Container engine detection failed (set TERMDRILL_ENGINE=mock to run without one)")?;
    Ok(engine)
}

/// Print the engine that would be used
pub async fn detect(config: &Config) -> Result<()> {
    let engine = detect_engine(config, runner()).await?;
    if engine.is_mock() {
        println!("✓ Engine: mock (no container runtime)");
    } else {
        println!("✓ Engine: {} {}", engine.name, engine.version);
    }
    Ok(())
}

/// Resolve a start request, sweep orphans, start the level and optionally
/// attach to its shell
pub async fn start(config: &Config, spec_path: &Path, attach: bool) -> Result<()> {
    let mut request: StartRequest = read_json(spec_path)?;
    if request.session_id.trim().is_empty() {
        request.session_id = Uuid::new_v4().to_string();
    }
    let spec = request.resolve().context("Invalid start request")?;

    let runner = runner();
    let engine = detect_engine(config, runner.clone()).await?;

    let reaper = OrphanReaper::new(engine.clone(), runner.clone()).with_timeout(config.engine_timeout());
    match reaper.cleanup_orphans(&spec.session_id).await {
        Ok(report) if !report.removed.is_empty() => {
            info!(removed = report.removed.len(), "Removed orphaned sandboxes")
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Orphan sweep failed, continuing"),
    }

    let mut provisioner = Provisioner::new(engine, runner)
        .with_timeout(config.engine_timeout())
        .with_rcfile(config.rcfile.clone());
    let handle = provisioner
        .start_level(&spec)
        .await
        .with_context(|| format!("Failed to start level '{}'", spec.level_id))?;

    println!("✓ Session: {}", handle.session_id());
    println!("✓ Workdir: {}", handle.workdir().display());

    let Some(shell) = handle.shell_command().cloned() else {
        println!("✓ Mock sandbox started (no live shell; use recorded playback)");
        return Ok(());
    };

    if let Some(name) = handle.container_name() {
        println!("✓ Container: {}", name);
    }

    if !attach {
        println!("\nAttach with:\n  {}", shell.to_command_line());
        println!("Remove with:\n  termdrill cleanup");
        return Ok(());
    }

    // Interactive session: stdio is inherited so the learner gets the TTY
    let status = Command::new(&shell.program)
        .args(&shell.args)
        .status()
        .with_context(|| format!("Failed to attach with {}", shell.program));

    provisioner.stop().await.context("Failed to stop sandbox")?;
    println!("✓ Sandbox stopped");

    let status = status?;
    if !status.success() {
        warn!(status = ?status.code(), "Shell exited with non-zero status");
    }
    Ok(())
}

/// Remove sandboxes that do not belong to `active_session`
pub async fn cleanup(config: &Config, active_session: Option<&str>) -> Result<()> {
    let runner = runner();
    let engine = detect_engine(config, runner.clone()).await?;
    let reaper = OrphanReaper::new(engine, runner).with_timeout(config.engine_timeout());

    let report = reaper
        .cleanup_orphans(active_session.unwrap_or(""))
        .await
        .context("Failed to list sandbox containers")?;

    for name in &report.removed {
        println!("  ✓ removed {}", name);
    }
    for name in &report.skipped {
        println!("  - kept {} (active session)", name);
    }
    for name in &report.failed {
        println!("  ✗ could not remove {}", name);
    }
    println!(
        "Cleanup: {} removed, {} kept, {} failed",
        report.removed.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(())
}

/// Grade an attempt and print the result
pub async fn grade(config: &Config, request_path: &Path, mock: bool, format: OutputFormat) -> Result<()> {
    let request: GradingRequest = read_json(request_path)?;
    if request.checks.is_empty() {
        bail!("Grading request {} has no checks", request_path.display());
    }

    let result = if mock || config.engine_mode == EngineMode::Mock {
        mock_grade(&request)
    } else {
        Grader::new(runner())
            .with_options(GraderOptions::from_config(config))
            .grade(&request)
            .await
            .context("Grading failed")?
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            print!("{}", report::render(&result)?);
        }
    }
    Ok(())
}
