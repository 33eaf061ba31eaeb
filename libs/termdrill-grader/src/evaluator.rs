/// Check Evaluators
///
/// **Core Responsibility:**
/// Turn one declarative check into a verdict against the sandbox's
/// resulting filesystem and command log.
///
/// **Critical Properties:**
/// - Absence (missing file, missing command log, unknown check type) is a
///   failed verdict, never an error
/// - `Err` is reserved for infrastructure: unreadable files, bad regexes,
///   check commands that cannot be spawned
/// - Knows nothing about scoring; the grader combines verdicts
///
/// **Dispatch:**
/// Exhaustive `match` over `CheckKind`. A kind this build cannot evaluate
/// arrives as `CheckKind::Unknown` and degrades to a failed verdict.

use regex::Regex;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use termdrill_common::check::{
    CmdlogContainsParams, CmdlogForbidsParams, CommandOutputParams, FileExistsParams,
    FileLinesCountParams, FileLinesMatchRegexParams, FileSortedParams, FileTextExactParams,
    SortKey, SortOrder,
};
use termdrill_common::naming::CMDLOG_RELATIVE_PATH;
use termdrill_common::{Artifact, CheckKind, RunInfo};
use termdrill_sandbox::{engine_for, CommandRunner, Invocation};
use tracing::debug;

use crate::error::{GradeError, Result};
use crate::text::{line_diff, normalize, resolve_path};

pub const DIFF_ARTIFACT_KIND: &str = "diff";

/// Everything an evaluator may read about the attempt
pub struct EvalContext {
    pub workdir: PathBuf,
    pub container_workdir: String,
    pub engine: String,
    pub container_name: Option<String>,
    pub runner: Arc<dyn CommandRunner>,
    pub default_timeout: Duration,
    pub diff_max_lines: usize,
}

impl EvalContext {
    pub fn for_run(
        run: &RunInfo,
        runner: Arc<dyn CommandRunner>,
        default_timeout: Duration,
        diff_max_lines: usize,
    ) -> Self {
        Self {
            workdir: run.workdir.clone(),
            container_workdir: run.container_workdir.clone(),
            engine: run.engine.clone(),
            container_name: run.container_name.clone(),
            runner,
            default_timeout,
            diff_max_lines,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(&self.workdir, &self.container_workdir, path)
    }

    fn diff_artifact(&self, expected: &str, actual: &str) -> Artifact {
        let diff = line_diff(expected, actual, self.diff_max_lines);
        Artifact {
            name: "diff".to_string(),
            kind: DIFF_ARTIFACT_KIND.to_string(),
            content: diff.content,
            truncated: diff.truncated,
        }
    }
}

/// A cmdlog check's contribution to the grading summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternHit {
    pub pattern: String,
    pub count: usize,
    pub total_commands: usize,
}

impl PatternHit {
    /// Contribution of a check that ran against a missing log
    pub fn empty(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            count: 0,
            total_commands: 0,
        }
    }
}

/// Verdict of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub passed: bool,
    pub message: String,
    pub artifacts: Vec<Artifact>,
    pub pattern_hit: Option<PatternHit>,
}

impl Evaluation {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            artifacts: Vec::new(),
            pattern_hit: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            ..Self::pass(message)
        }
    }

    fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    fn with_hit(mut self, hit: PatternHit) -> Self {
        self.pattern_hit = Some(hit);
        self
    }
}

/// Evaluate a single check
pub async fn evaluate(ctx: &EvalContext, kind: &CheckKind) -> Result<Evaluation> {
    match kind {
        CheckKind::FileExists(p) => file_exists(ctx, p).await,
        CheckKind::FileTextExact(p) => file_text_exact(ctx, p).await,
        CheckKind::FileLinesCount(p) => file_lines_count(ctx, p).await,
        CheckKind::FileLinesMatchRegex(p) => file_lines_match_regex(ctx, p).await,
        CheckKind::FileSorted(p) => file_sorted(ctx, p).await,
        CheckKind::CommandOutputEqualsFile(p) => command_output_equals_file(ctx, p).await,
        CheckKind::CmdlogContainsRegex(p) => cmdlog_contains_regex(ctx, p).await,
        CheckKind::CmdlogForbidsRegex(p) => cmdlog_forbids_regex(ctx, p).await,
        CheckKind::Unknown { type_name } => {
            Ok(Evaluation::fail(format!("unknown check type {:?}", type_name)))
        }
    }
}

/// Read a file as text; `Ok(None)` when it does not exist
async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GradeError::io(path, e)),
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| GradeError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

async fn file_exists(ctx: &EvalContext, p: &FileExistsParams) -> Result<Evaluation> {
    let path = ctx.resolve(&p.path);
    match tokio::fs::metadata(&path).await {
        Ok(_) => Ok(Evaluation::pass(format!("{} exists", p.path))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(Evaluation::fail(format!("{} not found", p.path)))
        }
        Err(e) => Err(GradeError::io(path, e)),
    }
}

async fn file_text_exact(ctx: &EvalContext, p: &FileTextExactParams) -> Result<Evaluation> {
    let Some(actual) = read_optional(&ctx.resolve(&p.path)).await? else {
        return Ok(Evaluation::fail(format!("{} not found", p.path)));
    };

    let expected = normalize(&p.expected, &p.normalize);
    let actual = normalize(&actual, &p.normalize);
    if expected == actual {
        return Ok(Evaluation::pass(format!("{} matches the expected text", p.path)));
    }

    Ok(Evaluation::fail(format!("{} does not match the expected text", p.path))
        .with_artifact(ctx.diff_artifact(&expected, &actual)))
}

async fn file_lines_count(ctx: &EvalContext, p: &FileLinesCountParams) -> Result<Evaluation> {
    let Some(text) = read_optional(&ctx.resolve(&p.path)).await? else {
        return Ok(Evaluation::fail(format!("{} not found", p.path)));
    };
    let count = text.lines().count();

    if let Some(equals) = p.equals {
        return Ok(if count == equals {
            Evaluation::pass(format!("{} has {} lines", p.path, count))
        } else {
            Evaluation::fail(format!("expected {} lines, got {}", equals, count))
        });
    }
    if let Some(min) = p.min.filter(|min| count < *min) {
        return Ok(Evaluation::fail(format!("expected at least {} lines, got {}", min, count)));
    }
    if let Some(max) = p.max.filter(|max| count > *max) {
        return Ok(Evaluation::fail(format!("expected at most {} lines, got {}", max, count)));
    }
    Ok(Evaluation::pass(format!("{} has {} lines", p.path, count)))
}

async fn file_lines_match_regex(ctx: &EvalContext, p: &FileLinesMatchRegexParams) -> Result<Evaluation> {
    let re = compile(&p.pattern)?;
    let Some(text) = read_optional(&ctx.resolve(&p.path)).await? else {
        return Ok(Evaluation::fail(format!("{} not found", p.path)));
    };

    match p.mode.as_deref().unwrap_or("all_lines") {
        "all_lines" => {
            for (index, line) in text.lines().enumerate() {
                if !re.is_match(line) {
                    return Ok(Evaluation::fail(format!(
                        "line {} does not match {}: {:?}",
                        index + 1,
                        p.pattern,
                        line
                    )));
                }
            }
            Ok(Evaluation::pass(format!("every line matches {}", p.pattern)))
        }
        "any_line" => Ok(if text.lines().any(|line| re.is_match(line)) {
            Evaluation::pass(format!("a line matches {}", p.pattern))
        } else {
            Evaluation::fail(format!("no line matches {}", p.pattern))
        }),
        "min_matches" => {
            let need = p.min_matches.unwrap_or(1);
            let got = text.lines().filter(|line| re.is_match(line)).count();
            Ok(if got >= need {
                Evaluation::pass(format!("{} lines match {}", got, p.pattern))
            } else {
                Evaluation::fail(format!("need {} matching lines got {}", need, got))
            })
        }
        other => Ok(Evaluation::fail(format!("unsupported match mode {:?}", other))),
    }
}

fn sort_key<'a>(line: &'a str, column: Option<usize>, delimiter: Option<&str>) -> &'a str {
    let column = match column {
        None | Some(0) => return line,
        Some(c) => c,
    };
    let field = match delimiter.filter(|d| !d.is_empty()) {
        Some(d) => line.split(d).nth(column - 1),
        None => line.split_whitespace().nth(column - 1),
    };
    field.unwrap_or("")
}

async fn file_sorted(ctx: &EvalContext, p: &FileSortedParams) -> Result<Evaluation> {
    let Some(text) = read_optional(&ctx.resolve(&p.path)).await? else {
        return Ok(Evaluation::fail(format!("{} not found", p.path)));
    };

    let mut previous: Option<(&str, Option<f64>)> = None;
    for (index, line) in text.lines().enumerate() {
        let key = sort_key(line, p.column, p.delimiter.as_deref());
        let number = match p.key {
            SortKey::Numeric => match key.trim().parse::<f64>() {
                Ok(n) if !n.is_nan() => Some(n),
                _ => {
                    return Ok(Evaluation::fail(format!(
                        "line {}: {:?} is not a number",
                        index + 1,
                        key
                    )))
                }
            },
            _ => None,
        };

        if let Some((prev_key, prev_number)) = previous {
            let ordering = match p.key {
                SortKey::Lex => prev_key.cmp(key),
                SortKey::CaseInsensitive => prev_key.to_lowercase().cmp(&key.to_lowercase()),
                SortKey::Numeric => prev_number
                    .zip(number)
                    .and_then(|(a, b)| a.partial_cmp(&b))
                    .unwrap_or(Ordering::Equal),
            };
            let out_of_order = match p.order {
                SortOrder::Asc => ordering == Ordering::Greater,
                SortOrder::Desc => ordering == Ordering::Less,
            };
            if out_of_order {
                return Ok(Evaluation::fail(format!("line {} is out of order", index + 1)));
            }
            if p.unique && ordering == Ordering::Equal {
                return Ok(Evaluation::fail(format!(
                    "line {} repeats the previous key {:?}",
                    index + 1,
                    key
                )));
            }
        }
        previous = Some((key, number));
    }

    Ok(Evaluation::pass(format!("{} is sorted", p.path)))
}

/// Exec inside the container when a real engine is attached, otherwise run
/// locally rooted at the workdir
fn check_invocation(ctx: &EvalContext, command: &str) -> Invocation {
    let container = engine_for(&ctx.engine).zip(ctx.container_name.as_deref());
    match container {
        Some((engine, name)) => Invocation::new(
            engine.name(),
            ["exec", "-w", ctx.container_workdir.as_str(), name, "sh", "-c", command],
        ),
        None => Invocation::new("sh", ["-c", command]).with_cwd(&ctx.workdir),
    }
}

async fn command_output_equals_file(ctx: &EvalContext, p: &CommandOutputParams) -> Result<Evaluation> {
    let Some(expected) = read_optional(&ctx.resolve(&p.expected_path)).await? else {
        return Ok(Evaluation::fail(format!("{} not found", p.expected_path)));
    };

    let timeout = p
        .timeout_ms
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(ctx.default_timeout);
    let invocation = check_invocation(ctx, &p.command).with_timeout(timeout);
    debug!(program = %invocation.program, command = %p.command, "Running check command");

    let output = ctx.runner.run(&invocation).await?;
    if output.timed_out {
        return Ok(Evaluation::fail(format!(
            "command timed out after {}ms",
            timeout.as_millis()
        )));
    }
    if !output.success() {
        let status = output
            .status
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return Ok(Evaluation::fail(format!("command exited with status {}", status)));
    }

    let expected = normalize(&expected, &p.normalize);
    let actual = normalize(&output.stdout, &p.normalize);
    if expected == actual {
        return Ok(Evaluation::pass(format!("output matches {}", p.expected_path)));
    }
    Ok(Evaluation::fail(format!("output does not match {}", p.expected_path))
        .with_artifact(ctx.diff_artifact(&expected, &actual)))
}

/// Commands recorded in the audit log, one per non-blank line.
/// Lines are `timestamp<TAB>command`; a line without a TAB is all command.
fn logged_commands(log: &str) -> Vec<&str> {
    log.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split_once('\t').map(|(_, cmd)| cmd).unwrap_or(line))
        .collect()
}

async fn read_cmdlog(ctx: &EvalContext) -> Result<Option<String>> {
    read_optional(&ctx.workdir.join(CMDLOG_RELATIVE_PATH)).await
}

async fn cmdlog_contains_regex(ctx: &EvalContext, p: &CmdlogContainsParams) -> Result<Evaluation> {
    let re = compile(&p.pattern)?;
    let Some(log) = read_cmdlog(ctx).await? else {
        return Ok(Evaluation::fail("command log not found").with_hit(PatternHit::empty(&p.pattern)));
    };

    let commands = logged_commands(&log);
    let count = commands.iter().filter(|cmd| re.is_match(cmd)).count();
    let need = p.min_count.unwrap_or(1);
    let hit = PatternHit {
        pattern: p.pattern.clone(),
        count,
        total_commands: commands.len(),
    };

    let evaluation = if count >= need {
        Evaluation::pass(format!("{} matching commands", count))
    } else {
        Evaluation::fail(format!("need {} got {}", need, count))
    };
    Ok(evaluation.with_hit(hit))
}

async fn cmdlog_forbids_regex(ctx: &EvalContext, p: &CmdlogForbidsParams) -> Result<Evaluation> {
    let re = compile(&p.pattern)?;
    let Some(log) = read_cmdlog(ctx).await? else {
        return Ok(Evaluation::pass("no commands logged").with_hit(PatternHit::empty(&p.pattern)));
    };

    let commands = logged_commands(&log);
    let matches: Vec<&str> = commands.iter().copied().filter(|cmd| re.is_match(cmd)).collect();
    let hit = PatternHit {
        pattern: p.pattern.clone(),
        count: matches.len(),
        total_commands: commands.len(),
    };

    let evaluation = match matches.first() {
        Some(first) => Evaluation::fail(format!("forbidden command used: {}", first)),
        None => Evaluation::pass(format!("no command matches {}", p.pattern)),
    };
    Ok(evaluation.with_hit(hit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use termdrill_common::NormalizeSpec;
    use termdrill_sandbox::ProcessRunner;

    fn context(workdir: &Path) -> EvalContext {
        EvalContext {
            workdir: workdir.to_path_buf(),
            container_workdir: "/work".to_string(),
            engine: "mock".to_string(),
            container_name: None,
            runner: Arc::new(ProcessRunner::new()),
            default_timeout: Duration::from_secs(3),
            diff_max_lines: 200,
        }
    }

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn sorted(path: &str, order: SortOrder, key: SortKey) -> FileSortedParams {
        FileSortedParams {
            path: path.to_string(),
            order,
            key,
            column: None,
            delimiter: None,
            unique: false,
        }
    }

    #[tokio::test]
    async fn test_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "out.txt", "x");
        let ctx = context(dir.path());

        let found = FileExistsParams { path: "/work/out.txt".to_string() };
        assert!(evaluate(&ctx, &CheckKind::FileExists(found)).await.unwrap().passed);

        let missing = FileExistsParams { path: "nope.txt".to_string() };
        let eval = evaluate(&ctx, &CheckKind::FileExists(missing)).await.unwrap();
        assert!(!eval.passed);
        assert_eq!(eval.message, "nope.txt not found");
    }

    #[tokio::test]
    async fn test_unknown_type_fails_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let kind = CheckKind::Unknown {
            type_name: "file_is_haiku".to_string(),
        };
        let eval = evaluate(&context(dir.path()), &kind).await.unwrap();
        assert!(!eval.passed);
        assert!(eval.message.contains("file_is_haiku"));
    }

    #[tokio::test]
    async fn test_text_exact_mismatch_has_diff() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "out.txt", "actual\n");
        let params = FileTextExactParams {
            path: "out.txt".to_string(),
            expected: "expected\n".to_string(),
            normalize: NormalizeSpec::default(),
        };

        let eval = evaluate(&context(dir.path()), &CheckKind::FileTextExact(params)).await.unwrap();

        assert!(!eval.passed);
        assert_eq!(eval.artifacts.len(), 1);
        assert!(eval.artifacts[0].content.contains("-expected\n+actual\n"));
    }

    #[tokio::test]
    async fn test_text_exact_crlf_normalized() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "out.txt", "a\r\nb\r\n");
        let params = FileTextExactParams {
            path: "out.txt".to_string(),
            expected: "a\nb\n".to_string(),
            normalize: NormalizeSpec::default(),
        };
        let eval = evaluate(&context(dir.path()), &CheckKind::FileTextExact(params)).await.unwrap();
        assert!(eval.passed);
        assert!(eval.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_lines_count_bounds() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "out.txt", "1\n2\n3\n");
        let ctx = context(dir.path());
        let count = |equals, min, max| {
            CheckKind::FileLinesCount(FileLinesCountParams {
                path: "out.txt".to_string(),
                equals,
                min,
                max,
            })
        };

        assert!(evaluate(&ctx, &count(Some(3), None, None)).await.unwrap().passed);
        assert!(!evaluate(&ctx, &count(Some(2), None, None)).await.unwrap().passed);
        assert!(evaluate(&ctx, &count(None, Some(2), Some(3))).await.unwrap().passed);
        let eval = evaluate(&ctx, &count(None, Some(4), None)).await.unwrap();
        assert_eq!(eval.message, "expected at least 4 lines, got 3");
        let eval = evaluate(&ctx, &count(None, None, Some(2))).await.unwrap();
        assert_eq!(eval.message, "expected at most 2 lines, got 3");
    }

    #[tokio::test]
    async fn test_match_regex_modes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "out.txt", "alpha\nBeta\ngamma\n");
        let ctx = context(dir.path());
        let check = |mode: Option<&str>, min_matches| {
            CheckKind::FileLinesMatchRegex(FileLinesMatchRegexParams {
                path: "out.txt".to_string(),
                pattern: "^[a-z]+$".to_string(),
                mode: mode.map(String::from),
                min_matches,
            })
        };

        let eval = evaluate(&ctx, &check(None, None)).await.unwrap();
        assert!(!eval.passed);
        assert!(eval.message.starts_with("line 2 does not match"));
        assert!(evaluate(&ctx, &check(Some("any_line"), None)).await.unwrap().passed);
        assert!(evaluate(&ctx, &check(Some("min_matches"), Some(2))).await.unwrap().passed);
        let eval = evaluate(&ctx, &check(Some("min_matches"), Some(3))).await.unwrap();
        assert_eq!(eval.message, "need 3 matching lines got 2");
        let eval = evaluate(&ctx, &check(Some("every_other"), None)).await.unwrap();
        assert!(!eval.passed);
        assert!(eval.message.contains("unsupported"));
    }

    #[tokio::test]
    async fn test_bad_regex_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let kind = CheckKind::CmdlogForbidsRegex(CmdlogForbidsParams {
            pattern: "(unclosed".to_string(),
        });
        let err = evaluate(&context(dir.path()), &kind).await.unwrap_err();
        assert!(matches!(err, GradeError::Regex { .. }));
    }

    #[tokio::test]
    async fn test_sorted_numeric_and_reversed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "asc.txt", "1\n2\n2\n10\n");
        write(dir.path(), "desc.txt", "10\n2\n2\n1\n");
        let ctx = context(dir.path());

        let asc = CheckKind::FileSorted(sorted("asc.txt", SortOrder::Asc, SortKey::Numeric));
        assert!(evaluate(&ctx, &asc).await.unwrap().passed);

        let reversed = CheckKind::FileSorted(sorted("desc.txt", SortOrder::Asc, SortKey::Numeric));
        let eval = evaluate(&ctx, &reversed).await.unwrap();
        assert!(!eval.passed);
        assert_eq!(eval.message, "line 2 is out of order");

        let desc = CheckKind::FileSorted(sorted("desc.txt", SortOrder::Desc, SortKey::Numeric));
        assert!(evaluate(&ctx, &desc).await.unwrap().passed);

        // "10" < "2" lexicographically
        let lex = CheckKind::FileSorted(sorted("asc.txt", SortOrder::Asc, SortKey::Lex));
        assert!(!evaluate(&ctx, &lex).await.unwrap().passed);
    }

    #[tokio::test]
    async fn test_sorted_column_unique_and_case() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "users.csv", "x,apple\ny,Banana\nz,cherry\nw,cherry\n");
        let ctx = context(dir.path());

        let mut params = sorted("users.csv", SortOrder::Asc, SortKey::CaseInsensitive);
        params.column = Some(2);
        params.delimiter = Some(",".to_string());
        assert!(evaluate(&ctx, &CheckKind::FileSorted(params.clone())).await.unwrap().passed);

        params.unique = true;
        let eval = evaluate(&ctx, &CheckKind::FileSorted(params.clone())).await.unwrap();
        assert!(!eval.passed);
        assert!(eval.message.starts_with("line 4 repeats"));

        params.unique = false;
        params.key = SortKey::Lex;
        // 'B' < 'a' in byte order
        assert!(!evaluate(&ctx, &CheckKind::FileSorted(params)).await.unwrap().passed);
    }

    #[tokio::test]
    async fn test_sorted_non_numeric_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "out.txt", "a 1\nb two\n");
        let mut params = sorted("out.txt", SortOrder::Asc, SortKey::Numeric);
        params.column = Some(2);

        let eval = evaluate(&context(dir.path()), &CheckKind::FileSorted(params)).await.unwrap();
        assert!(!eval.passed);
        assert_eq!(eval.message, "line 2: \"two\" is not a number");
    }

    #[tokio::test]
    async fn test_command_output_local() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "data.txt", "b\na\n");
        write(dir.path(), "expected.txt", "a\nb\n");
        let ctx = context(dir.path());
        let check = |command: &str| {
            CheckKind::CommandOutputEqualsFile(CommandOutputParams {
                command: command.to_string(),
                expected_path: "/work/expected.txt".to_string(),
                timeout_ms: Some(2000),
                normalize: NormalizeSpec::default(),
            })
        };

        assert!(evaluate(&ctx, &check("sort data.txt")).await.unwrap().passed);

        let eval = evaluate(&ctx, &check("cat data.txt")).await.unwrap();
        assert!(!eval.passed);
        assert_eq!(eval.artifacts.len(), 1);

        let eval = evaluate(&ctx, &check("exit 4")).await.unwrap();
        assert_eq!(eval.message, "command exited with status 4");
    }

    #[tokio::test]
    async fn test_command_output_timeout_is_a_verdict() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "expected.txt", "");
        let kind = CheckKind::CommandOutputEqualsFile(CommandOutputParams {
            command: "sleep 5".to_string(),
            expected_path: "expected.txt".to_string(),
            timeout_ms: Some(100),
            normalize: NormalizeSpec::default(),
        });

        let eval = evaluate(&context(dir.path()), &kind).await.unwrap();
        assert!(!eval.passed);
        assert_eq!(eval.message, "command timed out after 100ms");
    }

    #[tokio::test]
    async fn test_command_output_uses_default_timeout() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "expected.txt", "");
        let mut ctx = context(dir.path());
        ctx.default_timeout = Duration::from_millis(150);
        let kind = CheckKind::CommandOutputEqualsFile(CommandOutputParams {
            command: "sleep 5".to_string(),
            expected_path: "expected.txt".to_string(),
            timeout_ms: None,
            normalize: NormalizeSpec::default(),
        });

        let eval = evaluate(&ctx, &kind).await.unwrap();
        assert!(!eval.passed);
        assert_eq!(eval.message, "command timed out after 150ms");
    }

    #[test]
    fn test_check_invocation_targets_container() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.engine = "podman".to_string();
        ctx.container_name = Some("termdrill-s-l1".to_string());

        let inv = check_invocation(&ctx, "wc -l out.txt");
        assert_eq!(inv.program, "podman");
        assert_eq!(
            inv.args,
            vec!["exec", "-w", "/work", "termdrill-s-l1", "sh", "-c", "wc -l out.txt"]
        );
        assert!(inv.cwd.is_none());

        ctx.engine = "mock".to_string();
        let inv = check_invocation(&ctx, "true");
        assert_eq!(inv.program, "sh");
        assert_eq!(inv.cwd.as_deref(), Some(dir.path()));
    }

    #[tokio::test]
    async fn test_cmdlog_contains_need_got() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            CMDLOG_RELATIVE_PATH,
            "1700000000\tgrep foo a.txt\n\n1700000001\tls\n1700000002\tgrep -c bar b.txt\n",
        );
        let kind = CheckKind::CmdlogContainsRegex(CmdlogContainsParams {
            pattern: "^grep".to_string(),
            min_count: Some(3),
        });

        let eval = evaluate(&context(dir.path()), &kind).await.unwrap();

        assert!(!eval.passed);
        assert_eq!(eval.message, "need 3 got 2");
        assert_eq!(
            eval.pattern_hit,
            Some(PatternHit {
                pattern: "^grep".to_string(),
                count: 2,
                total_commands: 3,
            })
        );
    }

    #[tokio::test]
    async fn test_cmdlog_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let contains = CheckKind::CmdlogContainsRegex(CmdlogContainsParams {
            pattern: "ls".to_string(),
            min_count: None,
        });
        let eval = evaluate(&ctx, &contains).await.unwrap();
        assert!(!eval.passed);
        assert_eq!(eval.pattern_hit, Some(PatternHit::empty("ls")));

        let forbids = CheckKind::CmdlogForbidsRegex(CmdlogForbidsParams {
            pattern: "rm -rf".to_string(),
        });
        let eval = evaluate(&ctx, &forbids).await.unwrap();
        assert!(eval.passed);
        assert_eq!(eval.pattern_hit.map(|h| h.count), Some(0));
    }

    #[tokio::test]
    async fn test_cmdlog_forbids_match() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), CMDLOG_RELATIVE_PATH, "1\tls\n2\trm -rf /work/tmp\n");
        let kind = CheckKind::CmdlogForbidsRegex(CmdlogForbidsParams {
            pattern: "rm -rf".to_string(),
        });

        let eval = evaluate(&context(dir.path()), &kind).await.unwrap();
        assert!(!eval.passed);
        assert_eq!(eval.message, "forbidden command used: rm -rf /work/tmp");
    }

    #[test]
    fn test_logged_commands() {
        assert_eq!(
            logged_commands("1\tcat a\tb\nplain\n   \n"),
            vec!["cat a\tb", "plain"]
        );
    }
}
