//! Pre-flight checks for host tooling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lxlab_common::{CommandExecutor, CommandSpec, LabError, LabResult};

/// Binaries every provisioning run needs.
pub const REQUIRED_TOOLS: &[&str] = &["debootstrap", "virsh", "chroot", "bridge", "ip"];

/// Package hint shown for missing tools.
pub const INSTALL_HINT: &str = "sudo apt install debootstrap libvirt-daemon-driver-lxc bridge-utils";

/// Directories searched in addition to `PATH`; sudo's secure path includes
/// them even when the invoking user's does not.
const EXTRA_SEARCH_DIRS: &[&str] = &["/usr/sbin", "/sbin"];

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// What was checked.
    pub name: String,
    /// Whether it passed.
    pub ok: bool,
    /// Location or failure detail.
    pub detail: String,
}

/// Outcome of all checks.
#[derive(Debug, Clone, Default)]
pub struct RequirementsReport {
    /// Individual results, in check order.
    pub checks: Vec<CheckResult>,
}

impl RequirementsReport {
    /// Whether every check passed.
    #[must_use]
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }

    /// Names of failed checks.
    #[must_use]
    pub fn failures(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.ok)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Convert a failing report into an error.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::MissingDependency`] naming every failed check.
    pub fn ensure(&self) -> LabResult<()> {
        if self.all_ok() {
            return Ok(());
        }
        Err(LabError::MissingDependency {
            what: self.failures().join(", "),
            hint: Some(format!("Install with: {INSTALL_HINT}")),
        })
    }
}

/// Checks tools on the host and the libvirt LXC driver.
pub struct RequirementsChecker {
    executor: Arc<dyn CommandExecutor>,
    libvirt_uri: String,
    search_path: Vec<PathBuf>,
}

impl RequirementsChecker {
    /// Create a checker searching `PATH` plus the sbin directories.
    pub fn new(executor: Arc<dyn CommandExecutor>, libvirt_uri: impl Into<String>) -> Self {
        let mut search_path: Vec<PathBuf> = std::env::var_os("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        search_path.extend(EXTRA_SEARCH_DIRS.iter().map(PathBuf::from));
        Self {
            executor,
            libvirt_uri: libvirt_uri.into(),
            search_path,
        }
    }

    /// Search only `dirs` for tools.
    #[must_use]
    pub fn with_search_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_path = dirs;
        self
    }

    /// Locate `tool` in the search path.
    #[must_use]
    pub fn find_tool(&self, tool: &str) -> Option<PathBuf> {
        self.search_path
            .iter()
            .map(|dir| dir.join(tool))
            .find(|candidate| is_executable(candidate))
    }

    /// Run every check.
    pub async fn check(&self) -> RequirementsReport {
        let mut report = RequirementsReport::default();

        for tool in REQUIRED_TOOLS {
            let result = match self.find_tool(tool) {
                Some(path) => {
                    tracing::info!(tool, path = %path.display(), "tool available");
                    CheckResult {
                        name: (*tool).to_string(),
                        ok: true,
                        detail: path.display().to_string(),
                    }
                }
                None => {
                    tracing::error!(tool, "tool missing");
                    CheckResult {
                        name: (*tool).to_string(),
                        ok: false,
                        detail: "not found".to_string(),
                    }
                }
            };
            report.checks.push(result);
        }

        let list = CommandSpec::new("virsh")
            .args(["-c", self.libvirt_uri.as_str(), "list"])
            .privileged();
        let driver = match self.executor.run(&list).await {
            Ok(_) => {
                tracing::info!(uri = %self.libvirt_uri, "libvirt LXC driver working");
                CheckResult {
                    name: "libvirt-lxc".to_string(),
                    ok: true,
                    detail: self.libvirt_uri.clone(),
                }
            }
            Err(e) => {
                tracing::error!(uri = %self.libvirt_uri, error = %e, "libvirt LXC driver not working");
                CheckResult {
                    name: "libvirt-lxc".to_string(),
                    ok: false,
                    detail: e.to_string(),
                }
            }
        };
        report.checks.push(driver);
        report
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lxlab_common::testing::RecordingExecutor;

    fn fake_tools(dir: &Path, tools: &[&str]) {
        use std::os::unix::fs::PermissionsExt;
        for tool in tools {
            let path = dir.join(tool);
            std::fs::write(&path, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    #[tokio::test]
    async fn all_present() {
        let temp = tempfile::tempdir().unwrap();
        fake_tools(temp.path(), REQUIRED_TOOLS);
        let exec = Arc::new(RecordingExecutor::new());

        let report = RequirementsChecker::new(exec.clone(), "lxc:///")
            .with_search_path(vec![temp.path().to_path_buf()])
            .check()
            .await;

        assert!(report.all_ok());
        assert!(report.ensure().is_ok());
        assert_eq!(exec.command_lines(), vec!["virsh -c lxc:/// list"]);
    }

    #[tokio::test]
    async fn reports_missing_tool_and_driver() {
        let temp = tempfile::tempdir().unwrap();
        fake_tools(temp.path(), &["virsh", "chroot", "bridge", "ip"]);
        // Not executable, so not found.
        std::fs::write(temp.path().join("debootstrap"), "").unwrap();
        let exec = Arc::new(RecordingExecutor::new().fail_always("list"));

        let report = RequirementsChecker::new(exec, "lxc:///")
            .with_search_path(vec![temp.path().to_path_buf()])
            .check()
            .await;

        assert_eq!(report.failures(), vec!["debootstrap", "libvirt-lxc"]);
        let err = report.ensure().unwrap_err();
        assert_eq!(err.to_string(), "Missing dependency: debootstrap, libvirt-lxc");
    }
}
