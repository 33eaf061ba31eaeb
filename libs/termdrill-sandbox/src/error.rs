use std::time::Duration;
use thiserror::Error;

/// Errors raised while detecting, provisioning or tearing down sandboxes
#[derive(Error, Debug)]
pub enum SandboxError {
    /// No runtime passed the presence + health probe
    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("unsupported container engine: {0}")]
    UnsupportedEngine(String),

    /// The create invocation failed; carries the trimmed process output
    #[error("failed to create container {name}: {output}")]
    Provision { name: String, output: String },

    #[error("failed to run {program}: {source}")]
    Command {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("failed to remove container {name}: {output}")]
    Removal { name: String, output: String },

    #[error("{program} {action} failed: {output}")]
    EngineCommand {
        program: String,
        action: String,
        output: String,
    },
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
