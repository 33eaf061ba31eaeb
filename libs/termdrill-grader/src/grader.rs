//! Grader - composition root of the verification engine
//!
//! Evaluates every check in request order, applies message overrides,
//! persists diff artifacts when configured, scores the attempt and stamps the
//! result with the schema kind/version.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use termdrill_common::grading::{EngineDebug, PatternCount};
use termdrill_common::naming::{MOCK_ENGINE, RESULT_KIND, RESULT_SCHEMA_VERSION};
use termdrill_common::{
    CheckResult, CheckSpec, CmdlogAnalysis, Config, GradingRequest, GradingResult,
    RunInfo, ScoringPolicy,
};
use termdrill_sandbox::CommandRunner;
use tracing::{debug, info};

use crate::error::{GradeError, Result};
use crate::evaluator::{evaluate, EvalContext, Evaluation, PatternHit};
use crate::score::{compute_score, elapsed_seconds};

pub const DEFAULT_DIFF_MAX_LINES: usize = 200;

#[derive(Debug, Clone)]
pub struct GraderOptions {
    /// Timeout for check commands that do not set their own
    pub default_command_timeout: Duration,
    /// When set, diff artifacts are also written under `<dir>/<run_id>/`
    pub artifacts_dir: Option<PathBuf>,
    pub diff_max_lines: usize,
}

impl Default for GraderOptions {
    fn default() -> Self {
        Self {
            default_command_timeout: Duration::from_secs(3),
            artifacts_dir: None,
            diff_max_lines: DEFAULT_DIFF_MAX_LINES,
        }
    }
}

impl GraderOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_command_timeout: config.check_timeout(),
            artifacts_dir: config.artifacts_dir.clone(),
            ..Default::default()
        }
    }
}

pub struct Grader {
    runner: Arc<dyn CommandRunner>,
    options: GraderOptions,
}

impl Grader {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            options: GraderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GraderOptions) -> Self {
        self.options = options;
        self
    }

    /// Grade one attempt. Any error aborts the pass; no partial result.
    pub async fn grade(&self, request: &GradingRequest) -> Result<GradingResult> {
        ensure_unique_ids(&request.checks)?;

        let run = &request.run;
        let ctx = EvalContext::for_run(
            run,
            self.runner.clone(),
            self.options.default_command_timeout,
            self.options.diff_max_lines,
        );

        info!(
            run_id = %run.run_id,
            level = %run.level_id,
            attempt = run.attempt,
            checks = request.checks.len(),
            "Grading attempt"
        );

        let mut results = Vec::with_capacity(request.checks.len());
        let mut hits = Vec::new();

        // Sequential by contract: check commands may mutate the workdir
        for check in &request.checks {
            let evaluation = evaluate(&ctx, &check.kind).await?;
            debug!(
                check_id = %check.id,
                check_type = check.kind.type_name(),
                passed = evaluation.passed,
                "Check evaluated"
            );

            if let Some(hit) = evaluation.pattern_hit.clone() {
                hits.push(hit);
            }

            let mut result = check_result(check, evaluation);
            if let Some(dir) = &self.options.artifacts_dir {
                result.artifact_refs = persist_artifacts(dir, &run.run_id, &result).await?;
            }
            results.push(result);
        }

        let policy = request.scoring.resolve();
        let graded_at = Utc::now();
        let result = assemble(run, results, &policy, cmdlog_analysis(&hits), graded_at);

        info!(
            run_id = %run.run_id,
            passed = result.passed,
            total_points = result.score.total_points,
            "Grading complete"
        );
        Ok(result)
    }
}

fn ensure_unique_ids(checks: &[CheckSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for check in checks {
        if !seen.insert(check.id.as_str()) {
            return Err(GradeError::DuplicateCheckId(check.id.clone()));
        }
    }
    Ok(())
}

/// Per-check result with custom pass/fail text taking precedence
pub(crate) fn check_result(check: &CheckSpec, evaluation: Evaluation) -> CheckResult {
    let custom = if evaluation.passed {
        check.on_pass.as_ref()
    } else {
        check.on_fail.as_ref()
    };
    let message = custom
        .filter(|m| !m.trim().is_empty())
        .cloned()
        .unwrap_or(evaluation.message);

    CheckResult {
        id: check.id.clone(),
        check_type: check.kind.type_name().to_string(),
        required: check.required,
        points: check.points,
        passed: evaluation.passed,
        message,
        artifacts: evaluation.artifacts,
        artifact_refs: Vec::new(),
    }
}

/// Summary of every cmdlog check that ran; `None` if none did
fn cmdlog_analysis(hits: &[PatternHit]) -> Option<CmdlogAnalysis> {
    let total_commands = hits.iter().map(|h| h.total_commands).max()?;
    let mut pattern_counts: Vec<PatternCount> = Vec::new();
    for hit in hits {
        if !pattern_counts.iter().any(|p| p.pattern == hit.pattern) {
            pattern_counts.push(PatternCount {
                pattern: hit.pattern.clone(),
                count: hit.count,
            });
        }
    }
    Some(CmdlogAnalysis {
        total_commands,
        pattern_counts,
    })
}

fn file_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        s => s.to_string(),
    }
}

/// Write each artifact to `<dir>/<run_id>/<check_id>.diff` and return the
/// paths relative to `dir`
async fn persist_artifacts(dir: &Path, run_id: &str, result: &CheckResult) -> Result<Vec<String>> {
    if result.artifacts.is_empty() {
        return Ok(Vec::new());
    }

    let run_dir = file_component(run_id);
    let target = dir.join(&run_dir);
    tokio::fs::create_dir_all(&target)
        .await
        .map_err(|e| GradeError::io(&target, e))?;

    let check = file_component(&result.id);
    let mut refs = Vec::with_capacity(result.artifacts.len());
    for (index, artifact) in result.artifacts.iter().enumerate() {
        let file_name = if index == 0 {
            format!("{}.diff", check)
        } else {
            format!("{}-{}.diff", check, index + 1)
        };
        let path = target.join(&file_name);
        tokio::fs::write(&path, &artifact.content)
            .await
            .map_err(|e| GradeError::io(&path, e))?;
        refs.push(format!("{}/{}", run_dir, file_name));
    }
    Ok(refs)
}

/// Build the result envelope; shared by real and mock grading so both
/// produce the same shape
pub(crate) fn assemble(
    run: &RunInfo,
    checks: Vec<CheckResult>,
    policy: &ScoringPolicy,
    cmdlog: Option<CmdlogAnalysis>,
    graded_at: DateTime<Utc>,
) -> GradingResult {
    let passed = !checks.iter().any(|c| c.required && !c.passed);
    let bonus: i64 = checks
        .iter()
        .filter(|c| !c.required && c.passed)
        .map(|c| i64::from(c.points))
        .sum();

    let finished_at = run.finished_at.unwrap_or(graded_at);
    let score = compute_score(policy, elapsed_seconds(run.started_at, finished_at), bonus);

    let mut run = run.clone();
    run.finished_at = Some(finished_at);

    let engine = EngineDebug {
        mock: run.engine == MOCK_ENGINE,
        name: run.engine.clone(),
        container_name: run.container_name.clone(),
        image: run.image.clone(),
    };

    GradingResult {
        kind: RESULT_KIND.to_string(),
        schema_version: RESULT_SCHEMA_VERSION,
        run,
        passed,
        score,
        checks,
        cmdlog,
        engine,
        graded_at,
    }
}
