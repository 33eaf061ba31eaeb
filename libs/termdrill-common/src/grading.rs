use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::check::CheckSpec;
use crate::types::DEFAULT_WORK_MOUNT;

pub const DEFAULT_BASE_POINTS: i64 = 1000;
pub const DEFAULT_GRACE_SECONDS: i64 = 300;
pub const DEFAULT_PER_SECOND_PENALTY: i64 = 1;
pub const DEFAULT_HINT_PENALTY: i64 = 50;
pub const DEFAULT_RESET_PENALTY: i64 = 100;

/// Identity of the attempt being graded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub pack_id: String,
    pub level_id: String,
    pub run_id: String,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub engine: String,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    /// Host path of the sandbox workdir
    pub workdir: PathBuf,
    /// Where the workdir is mounted inside the container
    #[serde(default = "default_container_workdir")]
    pub container_workdir: String,
}

fn default_container_workdir() -> String {
    DEFAULT_WORK_MOUNT.to_string()
}

/// Scoring knobs as authored; absent fields fall back to defaults,
/// an explicit zero is honoured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub base_points: Option<i64>,
    pub grace_seconds: Option<i64>,
    pub per_second_penalty: Option<i64>,
    pub hint_penalty: Option<i64>,
    pub reset_penalty: Option<i64>,
    pub hints_used: u32,
    pub resets: u32,
}

/// Resolved scoring configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringPolicy {
    pub base_points: i64,
    pub grace_seconds: i64,
    pub per_second_penalty: i64,
    pub hint_penalty: i64,
    pub reset_penalty: i64,
    pub hints_used: u32,
    pub resets: u32,
}

impl ScoringConfig {
    pub fn resolve(&self) -> ScoringPolicy {
        ScoringPolicy {
            base_points: self.base_points.unwrap_or(DEFAULT_BASE_POINTS).max(0),
            grace_seconds: self.grace_seconds.unwrap_or(DEFAULT_GRACE_SECONDS).max(0),
            per_second_penalty: self
                .per_second_penalty
                .unwrap_or(DEFAULT_PER_SECOND_PENALTY)
                .max(0),
            hint_penalty: self.hint_penalty.unwrap_or(DEFAULT_HINT_PENALTY).max(0),
            reset_penalty: self.reset_penalty.unwrap_or(DEFAULT_RESET_PENALTY).max(0),
            hints_used: self.hints_used,
            resets: self.resets,
        }
    }
}

/// Everything the grader needs for one attempt.
/// Checks are evaluated in the order given.
#[derive(Debug, Clone, Deserialize)]
pub struct GradingRequest {
    pub run: RunInfo,
    pub checks: Vec<CheckSpec>,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// Named, human-readable preview attached to a failing comparison check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: String,
    #[serde(rename = "type")]
    pub check_type: String,
    pub required: bool,
    pub points: u32,
    pub passed: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_refs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreComponent {
    Time,
    Hint,
    Reset,
    Bonus,
}

/// One line of the score breakdown; penalties are negative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreLine {
    pub component: ScoreComponent,
    pub label: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub base_points: i64,
    pub time_penalty: i64,
    pub hint_penalty: i64,
    pub reset_penalty: i64,
    pub optional_bonus_points: i64,
    pub total_points: i64,
    pub elapsed_seconds: i64,
    pub breakdown: Vec<ScoreLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternCount {
    pub pattern: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdlogAnalysis {
    pub total_commands: usize,
    pub pattern_counts: Vec<PatternCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDebug {
    pub name: String,
    pub container_name: Option<String>,
    pub image: Option<String>,
    pub mock: bool,
}

/// Grading output envelope
///
/// `passed` is true iff no required check failed; it is independent of the
/// numeric score. Real and mock grading produce the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    pub kind: String,
    pub schema_version: u32,
    pub run: RunInfo,
    pub passed: bool,
    pub score: Score,
    pub checks: Vec<CheckResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmdlog: Option<CmdlogAnalysis>,
    pub engine: EngineDebug,
    pub graded_at: DateTime<Utc>,
}

impl GradingResult {
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}
