pub mod engine;
pub mod error;
pub mod handle;
pub mod probe;
pub mod provisioner;
pub mod reaper;
pub mod runner;

pub use engine::{engine_for, ContainerEngine, Docker, Podman};
pub use error::{Result, SandboxError};
pub use handle::{SandboxHandle, SandboxView, ShellCommand};
pub use probe::{EngineProbe, ProbeState};
pub use provisioner::Provisioner;
pub use reaper::{OrphanReaper, ReapReport};
pub use runner::{CommandOutput, CommandRunner, Invocation, ProcessRunner};
