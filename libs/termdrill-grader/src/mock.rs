//! Deterministic stand-in for the grader when no engine is active.
//!
//! Attempt 1 fails exactly the first required check with a canned diff,
//! any later attempt passes everything. Scoring and result shape are the
//! same as real grading.

use chrono::Utc;
use termdrill_common::{Artifact, GradingRequest, GradingResult};
use tracing::info;

use crate::evaluator::{Evaluation, DIFF_ARTIFACT_KIND};
use crate::grader::{assemble, check_result};

const MOCK_DIFF: &str = "--- expected\n+++ actual\n-expected output\n+actual output\n";

fn mock_diff() -> Artifact {
    Artifact {
        name: "diff".to_string(),
        kind: DIFF_ARTIFACT_KIND.to_string(),
        content: MOCK_DIFF.to_string(),
        truncated: false,
    }
}

/// Grade without touching any sandbox. Cannot fail.
pub fn mock_grade(request: &GradingRequest) -> GradingResult {
    let first_attempt = request.run.attempt <= 1;
    let failing = if first_attempt {
        request.checks.iter().position(|c| c.required)
    } else {
        None
    };

    let checks = request
        .checks
        .iter()
        .enumerate()
        .map(|(index, check)| {
            let evaluation = if Some(index) == failing {
                Evaluation {
                    passed: false,
                    message: "output does not match the expected result".to_string(),
                    artifacts: vec![mock_diff()],
                    pattern_hit: None,
                }
            } else {
                Evaluation {
                    passed: true,
                    message: "ok".to_string(),
                    artifacts: Vec::new(),
                    pattern_hit: None,
                }
            };
            check_result(check, evaluation)
        })
        .collect();

    let result = assemble(&request.run, checks, &request.scoring.resolve(), None, Utc::now());
    info!(
        run_id = %request.run.run_id,
        attempt = request.run.attempt,
        passed = result.passed,
        "Mock grading complete"
    );
    result
}
