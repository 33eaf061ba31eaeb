pub mod check;
pub mod config;
pub mod grading;
pub mod naming;
pub mod types;

// Re-export commonly used types for convenience
pub use check::{CheckKind, CheckSpec, NormalizeSpec};
pub use config::Config;
pub use grading::{
    Artifact, CheckResult, CmdlogAnalysis, GradingRequest, GradingResult, RunInfo, Score,
    ScoringConfig, ScoringPolicy,
};
pub use types::{EngineInfo, EngineMode, SpecError, StartRequest, StartSpec};
