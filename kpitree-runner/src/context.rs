//! Deployment context: where this run's files live.
//!
//! Built once at startup and passed down. Container deployments are
//! recognised by `/.dockerenv` or an `/app` directory and are rooted at
//! `/app`; otherwise the root is the working directory.

use serde::Serialize;
use std::path::{Path, PathBuf};

pub const CONTAINER_ROOT: &str = "/app";
pub const CONFIG_FILE_NAME: &str = "kpitree.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentKind {
    Container,
    Host,
    /// Root given explicitly on the command line.
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentContext {
    root: PathBuf,
    kind: DeploymentKind,
}

impl DeploymentContext {
    /// Probe the real filesystem.
    pub fn detect() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::detect_with(|p| p.exists(), cwd)
    }

    /// Detection with an injectable existence check.
    pub fn detect_with(exists: impl Fn(&Path) -> bool, cwd: PathBuf) -> Self {
        let in_container = exists(Path::new("/.dockerenv")) || exists(Path::new(CONTAINER_ROOT));
        if in_container {
            Self {
                root: PathBuf::from(CONTAINER_ROOT),
                kind: DeploymentKind::Container,
            }
        } else {
            Self {
                root: cwd,
                kind: DeploymentKind::Host,
            }
        }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            kind: DeploymentKind::Explicit,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind(&self) -> DeploymentKind {
        self.kind
    }

    /// Resolve a configured path; absolute paths pass through.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Config file picked up when `--config` is not given.
    pub fn default_config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dockerenv_means_container() {
        let ctx = DeploymentContext::detect_with(|p| p == Path::new("/.dockerenv"), "/work".into());
        assert_eq!(ctx.kind(), DeploymentKind::Container);
        assert_eq!(ctx.root(), Path::new("/app"));
    }

    #[test]
    fn app_dir_means_container() {
        let ctx = DeploymentContext::detect_with(|p| p == Path::new("/app"), "/work".into());
        assert_eq!(ctx.kind(), DeploymentKind::Container);
    }

    #[test]
    fn host_uses_cwd() {
        let ctx = DeploymentContext::detect_with(|_| false, "/work".into());
        assert_eq!(ctx.kind(), DeploymentKind::Host);
        assert_eq!(ctx.resolve("output/index.html"), PathBuf::from("/work/output/index.html"));
        assert_eq!(ctx.resolve("/abs/file"), PathBuf::from("/abs/file"));
        assert_eq!(ctx.default_config_path(), PathBuf::from("/work/kpitree.toml"));
    }
}
