//! Deterministic naming shared by the provisioner, the reaper and the grader.
//! Labels written at container creation are exactly the ones the reaper
//! filters on later, so both sides must come from here.

pub const LABEL_MANAGED: &str = "termdrill.managed";
pub const LABEL_SESSION: &str = "termdrill.session";
pub const LABEL_PACK: &str = "termdrill.pack";
pub const LABEL_LEVEL: &str = "termdrill.level";

/// Fixed hostname given to every sandbox
pub const SANDBOX_HOSTNAME: &str = "termdrill";

/// Append-only command-audit log, relative to the host workdir
pub const CMDLOG_RELATIVE_PATH: &str = ".termdrill/cmdlog.tsv";

/// Schema tag stamped on every grading result
pub const RESULT_KIND: &str = "termdrill.grading_result";
pub const RESULT_SCHEMA_VERSION: u32 = 1;

/// Engine name reported for synthetic sandboxes
pub const MOCK_ENGINE: &str = "mock";

/// Default container name for a session/level pair.
/// Anything outside `[a-z0-9_.-]` becomes `-` so the name is always accepted
/// by both docker and podman.
pub fn container_name(session_id: &str, level_id: &str) -> String {
    let raw = format!("termdrill-{}-{}", session_id, level_id);
    raw.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// `key=value` label argument
pub fn label(key: &str, value: &str) -> String {
    format!("{}={}", key, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name_deterministic() {
        let a = container_name("s1", "level-01");
        let b = container_name("s1", "level-01");
        assert_eq!(a, b);
        assert_eq!(a, "termdrill-s1-level-01");
    }

    #[test]
    fn test_container_name_sanitized() {
        assert_eq!(
            container_name("Sess/42", "grep basics"),
            "termdrill-sess-42-grep-basics"
        );
    }

    #[test]
    fn test_label_format() {
        assert_eq!(label(LABEL_SESSION, "abc"), "termdrill.session=abc");
    }
}
