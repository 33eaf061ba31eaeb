//! Container Engine - CLI dialect of one runtime
//!
//! docker and podman accept the same run/exec/rm/ps/inspect vocabulary.
//! The deltas that matter here are isolated behind this trait:
//! - capability-drop casing (`ALL` vs `all`)
//! - bind-mount flag syntax (`--mount type=bind,...` vs `-v src:dst:opts`)
//! - SELinux relabelling (podman only)
//!
//! Everything else in the provisioner is engine-symmetric.

use std::fmt;
use termdrill_common::types::BindMount;

pub trait ContainerEngine: Send + Sync + fmt::Debug {
    /// Binary name, also the engine name reported in `EngineInfo`
    fn name(&self) -> &'static str;

    /// Value passed to `--cap-drop` to drop every capability
    fn cap_drop_all(&self) -> &'static str;

    /// Arguments that bind `mount` into the container
    fn mount_args(&self, mount: &BindMount, selinux_label: bool) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Docker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Podman;

pub static DOCKER: Docker = Docker;
pub static PODMAN: Podman = Podman;

impl ContainerEngine for Docker {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn cap_drop_all(&self) -> &'static str {
        "ALL"
    }

    // docker has no relabel option on --mount; the label flag is ignored
    fn mount_args(&self, mount: &BindMount, _selinux_label: bool) -> Vec<String> {
        let mut spec = format!(
            "type=bind,source={},target={}",
            mount.host_path.display(),
            mount.container_path
        );
        if mount.read_only {
            spec.push_str(",readonly");
        }
        vec!["--mount".to_string(), spec]
    }
}

impl ContainerEngine for Podman {
    fn name(&self) -> &'static str {
        "podman"
    }

    fn cap_drop_all(&self) -> &'static str {
        "all"
    }

    fn mount_args(&self, mount: &BindMount, selinux_label: bool) -> Vec<String> {
        let mut options = Vec::new();
        if mount.read_only {
            options.push("ro");
        }
        if selinux_label {
            options.push("Z");
        }

        let mut volume = format!("{}:{}", mount.host_path.display(), mount.container_path);
        if !options.is_empty() {
            volume.push(':');
            volume.push_str(&options.join(","));
        }
        vec!["-v".to_string(), volume]
    }
}

/// Look up the strategy for an engine name
pub fn engine_for(name: &str) -> Option<&'static dyn ContainerEngine> {
    match name {
        "docker" => Some(&DOCKER),
        "podman" => Some(&PODMAN),
        _ => None,
    }
}

/// Auto-detection order
pub fn auto_order() -> [&'static dyn ContainerEngine; 2] {
    [&PODMAN, &DOCKER]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn mount(read_only: bool) -> BindMount {
        BindMount {
            host_path: PathBuf::from("/srv/data"),
            container_path: "/dataset".to_string(),
            read_only,
        }
    }

    #[test]
    fn test_cap_drop_casing() {
        assert_eq!(DOCKER.cap_drop_all(), "ALL");
        assert_eq!(PODMAN.cap_drop_all(), "all");
    }

    #[test]
    fn test_docker_mount_syntax() {
        assert_eq!(
            DOCKER.mount_args(&mount(true), true),
            vec![
                "--mount".to_string(),
                "type=bind,source=/srv/data,target=/dataset,readonly".to_string()
            ]
        );
        assert_eq!(
            DOCKER.mount_args(&mount(false), false)[1],
            "type=bind,source=/srv/data,target=/dataset"
        );
    }

    #[test]
    fn test_podman_mount_syntax() {
        assert_eq!(
            PODMAN.mount_args(&mount(true), false),
            vec!["-v".to_string(), "/srv/data:/dataset:ro".to_string()]
        );
        assert_eq!(PODMAN.mount_args(&mount(true), true)[1], "/srv/data:/dataset:ro,Z");
        assert_eq!(PODMAN.mount_args(&mount(false), true)[1], "/srv/data:/dataset:Z");
        assert_eq!(PODMAN.mount_args(&mount(false), false)[1], "/srv/data:/dataset");
    }

    #[test]
    fn test_engine_lookup() {
        assert_eq!(engine_for("docker").map(|e| e.name()), Some("docker"));
        assert_eq!(engine_for("podman").map(|e| e.name()), Some("podman"));
        assert!(engine_for("mock").is_none());
        assert!(engine_for("lxc").is_none());
    }

    #[test]
    fn test_auto_order_prefers_podman() {
        let names: Vec<_> = auto_order().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["podman", "docker"]);
    }
}
