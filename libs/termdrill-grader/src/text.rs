//! Text helpers shared by the comparison checks: normalization, path
//! resolution and the line diff used for artifacts.

use std::path::{Path, PathBuf};
use termdrill_common::NormalizeSpec;

/// Apply each enabled normalization rule, in a fixed order
pub fn normalize(text: &str, spec: &NormalizeSpec) -> String {
    let mut out = if spec.normalize_crlf {
        text.replace("\r\n", "\n")
    } else {
        text.to_string()
    };

    if spec.trim_trailing_whitespace {
        let ends_with_newline = out.ends_with('\n');
        let mut trimmed = out
            .split('\n')
            .map(trim_line_end)
            .collect::<Vec<_>>()
            .join("\n");
        if ends_with_newline && !trimmed.ends_with('\n') {
            trimmed.push('\n');
        }
        out = trimmed;
    }

    if spec.trim_final_newline {
        while out.ends_with('\n') {
            out.pop();
            if out.ends_with('\r') {
                out.pop();
            }
        }
    }
    out
}

// Spaces and tabs only; a kept `\r` stays part of the line ending
fn trim_line_end(line: &str) -> String {
    let horizontal = |c: char| c == ' ' || c == '\t';
    match line.strip_suffix('\r') {
        Some(body) => format!("{}\r", body.trim_end_matches(horizontal)),
        None => line.trim_end_matches(horizontal).to_string(),
    }
}

/// Map a check path onto the host filesystem.
///
/// `<mount>/x` lands in the workdir, `<mount>` itself is the workdir root,
/// other absolute paths are taken verbatim and relative paths join the workdir.
pub fn resolve_path(workdir: &Path, container_workdir: &str, path: &str) -> PathBuf {
    let mount = container_workdir.trim_end_matches('/');
    if !mount.is_empty() {
        if path == mount {
            return workdir.to_path_buf();
        }
        if let Some(rest) = path.strip_prefix(mount).and_then(|r| r.strip_prefix('/')) {
            return workdir.join(rest);
        }
    }

    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workdir.join(candidate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op<'a> {
    Same(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

// Above this many LCS cells the diff degrades to a positional comparison
const MAX_LCS_CELLS: usize = 4_000_000;

fn diff_ops<'a>(expected: &[&'a str], actual: &[&'a str]) -> Vec<Op<'a>> {
    let (n, m) = (expected.len(), actual.len());

    if n == 0 || m == 0 || (n + 1).saturating_mul(m + 1) > MAX_LCS_CELLS {
        let mut ops = Vec::with_capacity(n.max(m) * 2);
        for i in 0..n.max(m) {
            match (expected.get(i), actual.get(i)) {
                (Some(e), Some(a)) if e == a => ops.push(Op::Same(*e)),
                (e, a) => {
                    if let Some(e) = e {
                        ops.push(Op::Removed(*e));
                    }
                    if let Some(a) = a {
                        ops.push(Op::Added(*a));
                    }
                }
            }
        }
        return ops;
    }

    // lcs[i][j] = LCS length of expected[i..] and actual[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if expected[i] == actual[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if expected[i] == actual[j] {
            ops.push(Op::Same(expected[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push(Op::Removed(expected[i]));
            i += 1;
        } else {
            ops.push(Op::Added(actual[j]));
            j += 1;
        }
    }
    ops.extend(expected[i..].iter().map(|l| Op::Removed(*l)));
    ops.extend(actual[j..].iter().map(|l| Op::Added(*l)));
    ops
}

/// Rendered line diff, possibly cut short
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDiff {
    pub content: String,
    pub truncated: bool,
}

/// `-`/`+`/` ` prefixed line diff of expected vs actual, at most `max_lines`
/// body lines
pub fn line_diff(expected: &str, actual: &str, max_lines: usize) -> LineDiff {
    let expected_lines: Vec<&str> = expected.lines().collect();
    let actual_lines: Vec<&str> = actual.lines().collect();
    let ops = diff_ops(&expected_lines, &actual_lines);

    let mut content = String::from("--- expected\n+++ actual\n");
    for op in ops.iter().take(max_lines) {
        let (prefix, line) = match op {
            Op::Same(l) => (' ', l),
            Op::Removed(l) => ('-', l),
            Op::Added(l) => ('+', l),
        };
        content.push(prefix);
        content.push_str(line);
        content.push('\n');
    }

    // Content differing only in a final newline still needs a visible marker
    if expected_lines == actual_lines && expected != actual {
        content.push_str("\\ final newline differs\n");
    }

    let truncated = ops.len() > max_lines;
    if truncated {
        content.push_str(&format!("... {} more lines\n", ops.len() - max_lines));
    }
    LineDiff { content, truncated }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_final_newline_idempotent() {
        let spec = NormalizeSpec {
            trim_final_newline: true,
            ..Default::default()
        };
        assert_eq!(normalize("abc\n", &spec), normalize("abc", &spec));
        assert_eq!(normalize("abc", &spec), "abc");
    }

    #[test]
    fn test_normalize_rules_toggle_independently() {
        let text = "a  \r\nb\t\r\n";
        assert_eq!(normalize(text, &NormalizeSpec::default()), "a  \nb\t\n");

        let spec = NormalizeSpec {
            normalize_crlf: false,
            trim_trailing_whitespace: false,
            trim_final_newline: false,
        };
        assert_eq!(normalize(text, &spec), text);

        let spec = NormalizeSpec {
            trim_trailing_whitespace: true,
            ..Default::default()
        };
        assert_eq!(normalize(text, &spec), "a\nb\n");

        let spec = NormalizeSpec {
            trim_trailing_whitespace: true,
            trim_final_newline: true,
            ..Default::default()
        };
        assert_eq!(normalize(text, &spec), "a\nb");

        let spec = NormalizeSpec {
            normalize_crlf: false,
            trim_trailing_whitespace: true,
            trim_final_newline: false,
        };
        assert_eq!(normalize("a\r\nb\r\n", &spec), "a\r\nb\r\n");
        assert_eq!(normalize(text, &spec), "a\r\nb\r\n");
    }

    #[test]
    fn test_resolve_path() {
        let workdir = Path::new("/host/run/work");
        assert_eq!(resolve_path(workdir, "/work", "/work/out.txt"), workdir.join("out.txt"));
        assert_eq!(resolve_path(workdir, "/work", "/work"), workdir);
        assert_eq!(resolve_path(workdir, "/work", "/workshop/x"), PathBuf::from("/workshop/x"));
        assert_eq!(resolve_path(workdir, "/work", "/etc/passwd"), PathBuf::from("/etc/passwd"));
        assert_eq!(resolve_path(workdir, "/work", "sub/out.txt"), workdir.join("sub/out.txt"));
    }

    #[test]
    fn test_line_diff() {
        let diff = line_diff("a\nb\nc\n", "a\nx\nc\n", 200);
        assert_eq!(diff.content, "--- expected\n+++ actual\n a\n-b\n+x\n c\n");
        assert!(!diff.truncated);
    }

    #[test]
    fn test_line_diff_truncates() {
        let expected: String = (0..50).map(|i| format!("e{}\n", i)).collect();
        let diff = line_diff(&expected, "", 10);

        assert!(diff.truncated);
        assert!(diff.content.ends_with("... 40 more lines\n"));
        assert_eq!(diff.content.lines().filter(|l| l.starts_with('-') && !l.starts_with("---")).count(), 10);
    }

    #[test]
    fn test_line_diff_against_empty_side() {
        let diff = line_diff("a\nb\n", "", 200);
        assert_eq!(diff.content, "--- expected\n+++ actual\n-a\n-b\n");

        let diff = line_diff("", "x\n", 200);
        assert_eq!(diff.content, "--- expected\n+++ actual\n+x\n");
    }

    #[test]
    fn test_line_diff_final_newline_only() {
        let diff = line_diff("abc\n", "abc", 200);
        assert!(diff.content.contains("final newline differs"));
    }
}
