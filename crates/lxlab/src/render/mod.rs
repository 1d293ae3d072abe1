//! In-container configuration artifacts.
//!
//! Each [`Artifact`] renders one or more files from a [`ContainerSpec`].
//! Rendering is pure; [`Artifact::generate`] installs the rendered files
//! into a root-owned rootfs through the command executor, and
//! [`write_local`] writes them to a scratch directory for preview.

mod frr;
mod init_script;
mod test_script;

use std::fmt;
use std::path::{Path, PathBuf};

use lxlab_common::exec::write_file;
use lxlab_common::{CommandExecutor, LabResult};

use crate::spec::ContainerSpec;

pub use frr::{DAEMONS_PATH, ZEBRA_CONF_PATH};
pub use init_script::INIT_SCRIPT_PATH;
pub use test_script::TEST_SCRIPT_PATH;

/// A rendered file, relative to the rootfs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// Path relative to the rootfs root.
    pub path: PathBuf,
    /// File contents.
    pub contents: String,
    /// Permission bits.
    pub mode: u32,
}

impl RenderedFile {
    fn new(path: &str, contents: String, mode: u32) -> Self {
        Self {
            path: PathBuf::from(path),
            contents,
            mode,
        }
    }

    /// Absolute location under `rootfs`.
    #[must_use]
    pub fn target(&self, rootfs: &Path) -> PathBuf {
        rootfs.join(&self.path)
    }
}

/// Configuration artifacts written into every container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// FRR daemon selection and zebra configuration.
    RoutingDaemon,
    /// The `network-test` helper script.
    TestHelper,
    /// The container entry point.
    InitScript,
}

impl Artifact {
    /// Every artifact, in installation order.
    pub const ALL: [Self; 3] = [Self::RoutingDaemon, Self::TestHelper, Self::InitScript];

    /// Short name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RoutingDaemon => "routing-daemon",
            Self::TestHelper => "test-helper",
            Self::InitScript => "init-script",
        }
    }

    /// Render the files of this artifact.
    #[must_use]
    pub fn render(self, spec: &ContainerSpec) -> Vec<RenderedFile> {
        match self {
            Self::RoutingDaemon => vec![
                RenderedFile::new(DAEMONS_PATH, frr::daemons(), 0o644),
                RenderedFile::new(ZEBRA_CONF_PATH, frr::zebra_conf(spec), 0o644),
            ],
            Self::TestHelper => vec![RenderedFile::new(
                TEST_SCRIPT_PATH,
                test_script::render(spec),
                0o755,
            )],
            Self::InitScript => vec![RenderedFile::new(
                INIT_SCRIPT_PATH,
                init_script::render(spec),
                0o755,
            )],
        }
    }

    /// Render and install this artifact under `rootfs`.
    ///
    /// # Errors
    ///
    /// Returns the first failing write, directory creation or chmod.
    pub async fn generate(
        self,
        spec: &ContainerSpec,
        rootfs: &Path,
        executor: &dyn CommandExecutor,
    ) -> LabResult<()> {
        for file in self.render(spec) {
            write_file(executor, &file.target(rootfs), &file.contents, file.mode).await?;
        }
        tracing::info!(container = spec.name(), artifact = self.name(), "Generated configuration");
        Ok(())
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render every artifact into `dir` without privileges.
///
/// # Errors
///
/// Returns an I/O error if a directory or file cannot be written.
pub fn write_local(spec: &ContainerSpec, dir: &Path) -> LabResult<Vec<PathBuf>> {
    use std::os::unix::fs::PermissionsExt;

    let mut written = Vec::new();
    for artifact in Artifact::ALL {
        for file in artifact.render(spec) {
            let target = file.target(dir);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &file.contents)?;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(file.mode))?;
            written.push(target);
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::fixtures::{h1, h2};
    use lxlab_common::testing::RecordingExecutor;

    #[test]
    fn rendering_is_deterministic() {
        for artifact in Artifact::ALL {
            assert_eq!(artifact.render(&h2()), artifact.render(&h2()));
        }
    }

    #[test]
    fn modes() {
        let modes: Vec<_> = Artifact::ALL
            .iter()
            .flat_map(|a| a.render(&h1()))
            .map(|f| (f.path.display().to_string(), f.mode))
            .collect();
        assert_eq!(
            modes,
            vec![
                ("etc/frr/daemons".to_string(), 0o644),
                ("etc/frr/zebra.conf".to_string(), 0o644),
                ("usr/local/bin/network-test".to_string(), 0o755),
                ("usr/local/bin/container-init".to_string(), 0o755),
            ]
        );
    }

    #[tokio::test]
    async fn generate_installs_through_executor() {
        let exec = RecordingExecutor::new();
        let rootfs = Path::new("/var/lib/lxc/H1/rootfs");

        Artifact::RoutingDaemon
            .generate(&h1(), rootfs, &exec)
            .await
            .unwrap();

        let zebra = exec
            .written_file(&rootfs.join("etc/frr/zebra.conf"))
            .unwrap();
        assert!(zebra.contains("hostname H1"));
        assert_eq!(exec.count_matching("mkdir -p /var/lib/lxc/H1/rootfs/etc/frr"), 2);
        assert_eq!(exec.count_matching("chmod 644"), 2);
    }

    #[tokio::test]
    async fn generate_surfaces_write_failure() {
        let exec = RecordingExecutor::new().fail_always("tee");
        let result = Artifact::InitScript
            .generate(&h1(), Path::new("/rootfs"), &exec)
            .await;
        assert!(result.is_err());
        assert_eq!(exec.count_matching("chmod"), 0);
    }

    #[test]
    fn write_local_creates_tree() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let written = write_local(&h2(), temp.path()).unwrap();

        assert_eq!(written.len(), 4);
        let init = temp.path().join(INIT_SCRIPT_PATH);
        assert!(std::fs::read_to_string(&init).unwrap().starts_with("#!/bin/bash"));
        let mode = std::fs::metadata(&init).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
