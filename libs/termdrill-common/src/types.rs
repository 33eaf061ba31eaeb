use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::naming;

pub const DEFAULT_IMAGE: &str = "termdrill/sandbox:latest";
pub const DEFAULT_WORK_MOUNT: &str = "/work";
pub const DEFAULT_DATASET_MOUNT: &str = "/dataset";
pub const DEFAULT_SHELL: &str = "bash";
pub const DEFAULT_NETWORK: &str = "none";
pub const DEFAULT_PIDS_LIMIT: u64 = 256;
pub const DEFAULT_MEMORY_MB: u64 = 768;
pub const DEFAULT_CPUS: f64 = 1.0;
pub const DEFAULT_TMPFS: [&str; 2] = ["/tmp:rw,noexec,nosuid", "/run:rw,noexec,nosuid"];

/// Active container runtime
/// `name == "mock"` signals synthetic mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
}

impl EngineInfo {
    pub fn mock() -> Self {
        Self {
            name: naming::MOCK_ENGINE.to_string(),
            version: naming::MOCK_ENGINE.to_string(),
        }
    }

    pub fn is_mock(&self) -> bool {
        self.name == naming::MOCK_ENGINE
    }
}

/// How the engine probe chooses a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Auto,
    Docker,
    Podman,
    Mock,
}

impl EngineMode {
    /// Parse a mode from string (case-insensitive)
    pub fn parse(s: &str) -> Option<EngineMode> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Some(EngineMode::Auto),
            "docker" => Some(EngineMode::Docker),
            "podman" => Some(EngineMode::Podman),
            "mock" => Some(EngineMode::Mock),
            _ => None,
        }
    }
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMode::Auto => write!(f, "auto"),
            EngineMode::Docker => write!(f, "docker"),
            EngineMode::Podman => write!(f, "podman"),
            EngineMode::Mock => write!(f, "mock"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SpecError {
    #[error("start request is missing {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Level launch parameters as produced by the content loader.
/// Every field is optional; `resolve` turns it into a `StartSpec`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    pub session_id: String,
    pub pack_id: String,
    pub level_id: String,
    pub container_name: Option<String>,
    pub image: Option<String>,
    pub dataset_host_path: Option<PathBuf>,
    pub dataset_mount: Option<String>,
    pub work_host_path: Option<PathBuf>,
    pub work_mount: Option<String>,
    pub shell: Option<String>,
    pub shell_args: Vec<String>,
    pub shell_cwd: Option<String>,
    pub env: BTreeMap<String, String>,
    pub network: Option<String>,
    pub read_only_root: Option<bool>,
    pub cpus: Option<f64>,
    pub memory_mb: Option<u64>,
    pub pids_limit: Option<u64>,
    pub tmpfs: Vec<String>,
    pub selinux_label: bool,
}

/// Host directory bound into the sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "name")]
pub enum NetworkMode {
    /// Engine default networking; no flag is passed
    Inherit,
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpus: f64,
    pub memory_mb: u64,
    pub pids: u64,
}

/// Fully resolved launch parameters (immutable input to the provisioner)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSpec {
    pub session_id: String,
    pub pack_id: String,
    pub level_id: String,
    pub container_name: String,
    pub image: String,
    pub dataset: Option<BindMount>,
    pub work: BindMount,
    pub shell: ShellSpec,
    pub network: NetworkMode,
    pub read_only_root: bool,
    pub limits: ResourceLimits,
    pub tmpfs: Vec<String>,
    pub selinux_label: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl StartRequest {
    /// Apply every default in one place and validate what cannot be defaulted.
    /// A zero or absent limit means "use the default".
    pub fn resolve(self) -> Result<StartSpec, SpecError> {
        if self.session_id.trim().is_empty() {
            return Err(SpecError::Missing("session_id"));
        }
        if self.pack_id.trim().is_empty() {
            return Err(SpecError::Missing("pack_id"));
        }
        if self.level_id.trim().is_empty() {
            return Err(SpecError::Missing("level_id"));
        }
        let work_host_path = self
            .work_host_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(SpecError::Missing("work_host_path"))?;

        let cpus = match self.cpus {
            None => DEFAULT_CPUS,
            Some(c) if !c.is_finite() || c < 0.0 => {
                return Err(SpecError::Invalid {
                    field: "cpus",
                    reason: format!("{} is not a non-negative number", c),
                })
            }
            Some(c) if c == 0.0 => DEFAULT_CPUS,
            Some(c) => c,
        };
        let memory_mb = self.memory_mb.filter(|m| *m > 0).unwrap_or(DEFAULT_MEMORY_MB);
        let pids = self.pids_limit.filter(|p| *p > 0).unwrap_or(DEFAULT_PIDS_LIMIT);

        let work_mount = non_empty(self.work_mount).unwrap_or_else(|| DEFAULT_WORK_MOUNT.to_string());
        let dataset = self
            .dataset_host_path
            .filter(|p| !p.as_os_str().is_empty())
            .map(|host_path| BindMount {
                host_path,
                container_path: non_empty(self.dataset_mount)
                    .unwrap_or_else(|| DEFAULT_DATASET_MOUNT.to_string()),
                read_only: true,
            });

        let network = match non_empty(self.network) {
            None => NetworkMode::Named(DEFAULT_NETWORK.to_string()),
            Some(n) if n == "inherit" => NetworkMode::Inherit,
            Some(n) => NetworkMode::Named(n),
        };

        let tmpfs = if self.tmpfs.is_empty() {
            DEFAULT_TMPFS.iter().map(|t| t.to_string()).collect()
        } else {
            self.tmpfs
        };

        let container_name = non_empty(self.container_name)
            .unwrap_or_else(|| naming::container_name(&self.session_id, &self.level_id));

        Ok(StartSpec {
            container_name,
            image: non_empty(self.image).unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            dataset,
            shell: ShellSpec {
                program: non_empty(self.shell).unwrap_or_else(|| DEFAULT_SHELL.to_string()),
                args: self.shell_args,
                cwd: non_empty(self.shell_cwd).unwrap_or_else(|| work_mount.clone()),
                env: self.env,
            },
            work: BindMount {
                host_path: work_host_path,
                container_path: work_mount,
                read_only: false,
            },
            network,
            read_only_root: self.read_only_root.unwrap_or(true),
            limits: ResourceLimits {
                cpus,
                memory_mb,
                pids,
            },
            tmpfs,
            selinux_label: self.selinux_label,
            session_id: self.session_id,
            pack_id: self.pack_id,
            level_id: self.level_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> StartRequest {
        StartRequest {
            session_id: "sess-1".to_string(),
            pack_id: "basics".to_string(),
            level_id: "01-grep".to_string(),
            work_host_path: Some(PathBuf::from("/tmp/work")),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let spec = request().resolve().unwrap();

        assert_eq!(spec.container_name, "termdrill-sess-1-01-grep");
        assert_eq!(spec.image, DEFAULT_IMAGE);
        assert_eq!(spec.work.container_path, "/work");
        assert!(!spec.work.read_only);
        assert!(spec.dataset.is_none());
        assert_eq!(spec.shell.program, "bash");
        assert_eq!(spec.shell.cwd, "/work");
        assert_eq!(spec.network, NetworkMode::Named("none".to_string()));
        assert!(spec.read_only_root);
        assert_eq!(spec.limits.pids, 256);
        assert_eq!(spec.limits.memory_mb, 768);
        assert_eq!(spec.limits.cpus, 1.0);
        assert_eq!(
            spec.tmpfs,
            vec!["/tmp:rw,noexec,nosuid".to_string(), "/run:rw,noexec,nosuid".to_string()]
        );
    }

    #[test]
    fn test_resolve_keeps_explicit_values() {
        let mut req = request();
        req.image = Some("alpine:3.20".to_string());
        req.dataset_host_path = Some(PathBuf::from("/srv/data"));
        req.network = Some("inherit".to_string());
        req.read_only_root = Some(false);
        req.cpus = Some(0.5);
        req.memory_mb = Some(128);
        req.pids_limit = Some(0);
        req.shell_cwd = Some("/work/src".to_string());

        let spec = req.resolve().unwrap();

        assert_eq!(spec.image, "alpine:3.20");
        let dataset = spec.dataset.unwrap();
        assert_eq!(dataset.container_path, "/dataset");
        assert!(dataset.read_only);
        assert_eq!(spec.network, NetworkMode::Inherit);
        assert!(!spec.read_only_root);
        assert_eq!(spec.limits.cpus, 0.5);
        assert_eq!(spec.limits.memory_mb, 128);
        assert_eq!(spec.limits.pids, 256);
        assert_eq!(spec.shell.cwd, "/work/src");
    }

    #[test]
    fn test_resolve_rejects_missing_ids() {
        let mut req = request();
        req.level_id = "  ".to_string();
        assert_eq!(req.resolve().unwrap_err(), SpecError::Missing("level_id"));

        let mut req = request();
        req.work_host_path = None;
        assert_eq!(req.resolve().unwrap_err(), SpecError::Missing("work_host_path"));
    }

    #[test]
    fn test_resolve_rejects_negative_cpus() {
        let mut req = request();
        req.cpus = Some(-1.0);
        assert!(matches!(
            req.resolve(),
            Err(SpecError::Invalid { field: "cpus", .. })
        ));
    }

    #[test]
    fn test_start_request_from_json() {
        let json = r#"{
            "session_id": "s",
            "pack_id": "p",
            "level_id": "l",
            "work_host_path": "/tmp/w",
            "env": {"FOO": "bar"},
            "tmpfs": ["/tmp:rw"]
        }"#;
        let req: StartRequest = serde_json::from_str(json).unwrap();
        let spec = req.resolve().unwrap();
        assert_eq!(spec.shell.env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(spec.tmpfs, vec!["/tmp:rw".to_string()]);
    }

    #[test]
    fn test_engine_mode_parse() {
        assert_eq!(EngineMode::parse("auto"), Some(EngineMode::Auto));
        assert_eq!(EngineMode::parse(""), Some(EngineMode::Auto));
        assert_eq!(EngineMode::parse("Podman"), Some(EngineMode::Podman));
        assert_eq!(EngineMode::parse("DOCKER"), Some(EngineMode::Docker));
        assert_eq!(EngineMode::parse("mock"), Some(EngineMode::Mock));
        assert_eq!(EngineMode::parse("containerd"), None);
    }

    #[test]
    fn test_engine_info_mock() {
        let info = EngineInfo::mock();
        assert!(info.is_mock());
        assert_eq!(info.name, "mock");
    }
}
