//! Provisioning configuration.

use std::path::PathBuf;

use lxlab_common::LabPaths;

/// Default Ubuntu package mirror.
pub const DEFAULT_MIRROR: &str = "http://us.archive.ubuntu.com/ubuntu/";
/// Default distribution suite.
pub const DEFAULT_SUITE: &str = "jammy";
/// Default bootstrap architecture.
pub const DEFAULT_ARCH: &str = "amd64";
/// Default number of bootstrap attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default libvirt connection URI.
pub const DEFAULT_LIBVIRT_URI: &str = "lxc:///";

/// Root filesystem bootstrap options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOptions {
    /// Package mirror URL.
    pub mirror: String,
    /// Distribution suite.
    pub suite: String,
    /// Target architecture.
    pub arch: String,
    /// Total bootstrap attempts before giving up.
    pub max_attempts: u32,
    /// Restrict downloads to IPv4.
    pub force_ipv4: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            mirror: DEFAULT_MIRROR.to_string(),
            suite: DEFAULT_SUITE.to_string(),
            arch: DEFAULT_ARCH.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            force_ipv4: true,
        }
    }
}

/// Provisioning configuration options.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Container directory layout.
    pub paths: LabPaths,
    /// Rootfs bootstrap options.
    pub bootstrap: BootstrapOptions,
    /// libvirt connection URI.
    pub libvirt_uri: String,
    /// Log commands instead of running them.
    pub dry_run: bool,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            paths: LabPaths::new(),
            bootstrap: BootstrapOptions::default(),
            libvirt_uri: DEFAULT_LIBVIRT_URI.to_string(),
            dry_run: false,
        }
    }
}

impl ProvisionConfig {
    /// Set the base directory for container trees.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths = LabPaths::with_root(root);
        self
    }

    /// Set the package mirror.
    #[must_use]
    pub fn with_mirror(mut self, mirror: impl Into<String>) -> Self {
        self.bootstrap.mirror = mirror.into();
        self
    }

    /// Set the number of bootstrap attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.bootstrap.max_attempts = max_attempts;
        self
    }

    /// Allow or forbid IPv6 during bootstrap.
    #[must_use]
    pub const fn with_force_ipv4(mut self, force_ipv4: bool) -> Self {
        self.bootstrap.force_ipv4 = force_ipv4;
        self
    }

    /// Set the libvirt connection URI.
    #[must_use]
    pub fn with_libvirt_uri(mut self, uri: impl Into<String>) -> Self {
        self.libvirt_uri = uri.into();
        self
    }

    /// Log commands instead of running them.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
