//! On-disk layout of provisioned containers.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::LabResult;
use crate::exec::{CommandExecutor, CommandSpec};

/// Default base directory for container trees.
pub static LXLAB_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("LXLAB_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/lxc"))
});

/// Directory layout for containers below a base path.
///
/// Every path is a pure function of the base and the container name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabPaths {
    /// Base directory (default: /var/lib/lxc).
    pub root: PathBuf,
}

impl LabPaths {
    /// Create paths with the default location.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom base directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Base directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a specific container.
    #[must_use]
    pub fn container(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Container rootfs directory.
    #[must_use]
    pub fn container_rootfs(&self, name: &str) -> PathBuf {
        self.container(name).join("rootfs")
    }

    /// Create the container directory and its rootfs with privileges.
    ///
    /// Succeeds when the directories already exist.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed `mkdir`.
    pub async fn create_container_dirs(
        &self,
        executor: &dyn CommandExecutor,
        name: &str,
    ) -> LabResult<()> {
        let container = self.container(name);
        executor
            .run(
                &CommandSpec::new("mkdir")
                    .arg("-p")
                    .path(&container)
                    .path(&self.container_rootfs(name))
                    .privileged(),
            )
            .await?;
        tracing::info!(container = name, path = %container.display(), "Created container directories");
        Ok(())
    }
}

impl Default for LabPaths {
    fn default() -> Self {
        Self {
            root: LXLAB_ROOT.clone(),
        }
    }
}
