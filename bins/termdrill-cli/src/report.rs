// Plain-text rendering of a grading result
use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use termdrill_common::GradingResult;

const REPORT_TEMPLATE: &str = "\
{{pack}}/{{level}} attempt {{attempt}}: {{#if passed}}PASSED{{else}}FAILED{{/if}}
Score: {{total}} (base {{base}}, {{elapsed}}s elapsed)
{{#each lines}}  {{label}}: {{points}}
{{/each}}
Checks:
{{#each checks}}  [{{status}}] {{id}} ({{check_type}}): {{message}}
{{#if diff}}{{diff}}{{/if}}{{/each}}";

#[derive(Serialize)]
struct LineView {
    label: String,
    points: i64,
}

#[derive(Serialize)]
struct CheckView {
    status: &'static str,
    id: String,
    check_type: String,
    message: String,
    diff: String,
}

#[derive(Serialize)]
struct ReportView {
    pack: String,
    level: String,
    attempt: u32,
    passed: bool,
    total: i64,
    base: i64,
    elapsed: i64,
    lines: Vec<LineView>,
    checks: Vec<CheckView>,
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("      {}\n", l)).collect()
}

fn view(result: &GradingResult) -> ReportView {
    ReportView {
        pack: result.run.pack_id.clone(),
        level: result.run.level_id.clone(),
        attempt: result.run.attempt,
        passed: result.passed,
        total: result.score.total_points,
        base: result.score.base_points,
        elapsed: result.score.elapsed_seconds,
        lines: result
            .score
            .breakdown
            .iter()
            .map(|l| LineView {
                label: l.label.clone(),
                points: l.points,
            })
            .collect(),
        checks: result
            .checks
            .iter()
            .map(|c| CheckView {
                status: match (c.passed, c.required) {
                    (true, _) => "PASS",
                    (false, true) => "FAIL",
                    (false, false) => "MISS",
                },
                id: c.id.clone(),
                check_type: c.check_type.clone(),
                message: c.message.clone(),
                diff: c.artifacts.iter().map(|a| indent(&a.content)).collect(),
            })
            .collect(),
    }
}

/// Render the text report for a grading result
pub fn render(result: &GradingResult) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .render_template(REPORT_TEMPLATE, &view(result))
        .context("Failed to render grading report")
}
