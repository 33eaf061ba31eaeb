use std::path::PathBuf;
use termdrill_sandbox::SandboxError;
use thiserror::Error;

/// Infrastructural failures that abort a whole grading pass.
/// Negative verdicts are never errors.
#[derive(Error, Debug)]
pub enum GradeError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid regex {pattern:?}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("check command could not be run: {0}")]
    Command(#[from] SandboxError),

    #[error("duplicate check id {0:?}")]
    DuplicateCheckId(String),
}

impl GradeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GradeError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GradeError>;
