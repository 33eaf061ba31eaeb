//! Container Provisioner
//!
//! Turns a resolved `StartSpec` into one detached "create" invocation (run
//! immediately) and one interactive "exec" invocation (stored on the handle
//! for the terminal layer to attach later).
//!
//! Security policy applied to every sandbox:
//! - all capabilities dropped, `no-new-privileges`
//! - pids / memory / cpu caps
//! - read-only root unless the level opts out, noexec tmpfs scratch space
//! - no network unless the level names one
//! - dataset bound read-only, workdir bound read-write

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use termdrill_common::config::DEFAULT_RCFILE;
use termdrill_common::naming::{self, LABEL_LEVEL, LABEL_MANAGED, LABEL_PACK, LABEL_SESSION};
use termdrill_common::types::NetworkMode;
use termdrill_common::{EngineInfo, StartSpec};
use tracing::{error, info};

use crate::engine::{engine_for, ContainerEngine};
use crate::error::{Result, SandboxError};
use crate::handle::{SandboxHandle, ShellCommand};
use crate::runner::{CommandRunner, Invocation};

/// Session environment every shell gets before caller overrides
pub fn session_env(spec: &StartSpec) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("TERM".to_string(), "xterm-256color".to_string());
    env.insert("LANG".to_string(), "C.UTF-8".to_string());
    env.insert("LC_ALL".to_string(), "C.UTF-8".to_string());
    for (key, value) in &spec.shell.env {
        env.insert(key.clone(), value.clone());
    }
    env
}

/// Arguments for the detached create invocation
pub fn create_args(engine: &dyn ContainerEngine, spec: &StartSpec) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "-d".into(),
        "--name".into(),
        spec.container_name.clone(),
        "--hostname".into(),
        naming::SANDBOX_HOSTNAME.into(),
        "--cap-drop".into(),
        engine.cap_drop_all().into(),
        "--security-opt".into(),
        "no-new-privileges".into(),
        "--pids-limit".into(),
        spec.limits.pids.to_string(),
        "--memory".into(),
        format!("{}m", spec.limits.memory_mb),
        "--cpus".into(),
        spec.limits.cpus.to_string(),
    ];

    for (key, value) in [
        (LABEL_MANAGED, "true"),
        (LABEL_SESSION, spec.session_id.as_str()),
        (LABEL_LEVEL, spec.level_id.as_str()),
        (LABEL_PACK, spec.pack_id.as_str()),
    ] {
        args.push("--label".into());
        args.push(naming::label(key, value));
    }

    if let NetworkMode::Named(network) = &spec.network {
        args.push("--network".into());
        args.push(network.clone());
    }

    if spec.read_only_root {
        args.push("--read-only".into());
    }

    for tmpfs in &spec.tmpfs {
        args.push("--tmpfs".into());
        args.push(tmpfs.clone());
    }

    if let Some(dataset) = &spec.dataset {
        args.extend(engine.mount_args(dataset, spec.selinux_label));
    }
    args.extend(engine.mount_args(&spec.work, spec.selinux_label));

    // Keep the container alive so a shell can be attached afterwards
    args.push(spec.image.clone());
    args.push("sleep".into());
    args.push("infinity".into());
    args
}

/// Shell argv with login mode removed and the session rc file injected (bash only)
pub fn shell_args(program: &str, args: &[String], rcfile: &str) -> Vec<String> {
    let is_bash = program.rsplit('/').next() == Some("bash");
    if !is_bash {
        return args.to_vec();
    }

    let mut out: Vec<String> = args.iter().filter(|a| *a != "--login").cloned().collect();
    let has_rcfile = out.iter().any(|a| a == "--rcfile" || a == "--init-file");
    if !has_rcfile {
        out.splice(0..0, ["--rcfile".to_string(), rcfile.to_string()]);
    }
    out
}

/// Arguments for the interactive exec invocation
pub fn exec_args(spec: &StartSpec, rcfile: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["exec".into(), "-it".into()];
    for (key, value) in session_env(spec) {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }
    args.push("-w".into());
    args.push(spec.shell.cwd.clone());
    args.push(spec.container_name.clone());
    args.push(spec.shell.program.clone());
    args.extend(shell_args(&spec.shell.program, &spec.shell.args, rcfile));
    args
}

/// Owns the learner session's sandbox; at most one is live at a time
pub struct Provisioner {
    engine: EngineInfo,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    rcfile: String,
    current: Option<SandboxHandle>,
}

impl Provisioner {
    pub fn new(engine: EngineInfo, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            engine,
            runner,
            timeout: Duration::from_secs(60),
            rcfile: DEFAULT_RCFILE.to_string(),
            current: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rcfile(mut self, rcfile: impl Into<String>) -> Self {
        self.rcfile = rcfile.into();
        self
    }

    pub fn engine(&self) -> &EngineInfo {
        &self.engine
    }

    pub fn current(&self) -> Option<&SandboxHandle> {
        self.current.as_ref()
    }

    /// Provision a sandbox for `spec`, stopping any previous one first.
    /// A create failure is returned as-is; nothing is retried here.
    pub async fn start_level(&mut self, spec: &StartSpec) -> Result<&SandboxHandle> {
        self.stop().await?;

        let handle = if self.engine.is_mock() {
            info!(
                session = %spec.session_id,
                level = %spec.level_id,
                "Starting mock sandbox"
            );
            self.handle_for(spec, None)
        } else {
            let engine = engine_for(&self.engine.name)
                .ok_or_else(|| SandboxError::UnsupportedEngine(self.engine.name.clone()))?;

            let create = Invocation::new(engine.name(), create_args(engine, spec)).with_timeout(self.timeout);
            info!(
                engine = engine.name(),
                container = %spec.container_name,
                image = %spec.image,
                level = %spec.level_id,
                "Creating sandbox container"
            );
            let output = self.runner.run(&create).await?;
            if !output.success() {
                let output = output.combined();
                error!(container = %spec.container_name, output = %output, "Container create failed");
                return Err(SandboxError::Provision {
                    name: spec.container_name.clone(),
                    output,
                });
            }

            let shell = ShellCommand {
                program: engine.name().to_string(),
                args: exec_args(spec, &self.rcfile),
            };
            self.handle_for(spec, Some(shell))
        };

        Ok(self.current.insert(handle))
    }

    /// Stop the live sandbox, if any
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(mut handle) = self.current.take() {
            if let Err(e) = handle.stop().await {
                self.current = Some(handle);
                return Err(e);
            }
        }
        Ok(())
    }

    fn handle_for(&self, spec: &StartSpec, shell: Option<ShellCommand>) -> SandboxHandle {
        let mock = shell.is_none();
        SandboxHandle {
            engine: self.engine.clone(),
            session_id: spec.session_id.clone(),
            pack_id: spec.pack_id.clone(),
            level_id: spec.level_id.clone(),
            container_name: if mock { None } else { Some(spec.container_name.clone()) },
            image: if mock { None } else { Some(spec.image.clone()) },
            workdir: spec.work.host_path.clone(),
            container_workdir: spec.work.container_path.clone(),
            cwd: spec.shell.cwd.clone(),
            env: session_env(spec),
            shell,
            runner: self.runner.clone(),
            timeout: self.timeout,
            stopped: false,
        }
    }
}
