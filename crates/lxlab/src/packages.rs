//! Package installation inside a bootstrapped rootfs.

use std::sync::Arc;

use lxlab_common::{CommandExecutor, CommandSpec, LabError, LabPaths, LabResult};

/// Packages installed in a single `apt install` call.
pub const CORE_PACKAGES: &[&str] = &[
    "iputils-ping",
    "iputils-tracepath",
    "mtr-tiny",
    "netcat-openbsd",
    "tcpdump",
    "curl",
    "wget",
    "bind9-dnsutils",
    "net-tools",
    "iproute2",
    "iptables",
    "bridge-utils",
    "ethtool",
    "socat",
    "openssh-server",
    "vim",
    "nano",
    "htop",
    "frr",
    "python3",
    "locales",
    "vlan",
];

/// Packages installed one by one; a failure is logged and skipped.
pub const OPTIONAL_PACKAGES: &[&str] = &["nmap", "iperf3", "hping3"];

/// Installs the test tooling into a container rootfs through `chroot`.
pub struct PackageInstaller {
    executor: Arc<dyn CommandExecutor>,
    paths: LabPaths,
}

impl PackageInstaller {
    /// Create an installer.
    pub fn new(executor: Arc<dyn CommandExecutor>, paths: LabPaths) -> Self {
        Self { executor, paths }
    }

    /// Run the installation script inside the rootfs of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::PackageInstall`] if the script exits non-zero.
    /// Packages installed before the failure are left in place.
    pub async fn install_packages(&self, name: &str) -> LabResult<()> {
        let rootfs = self.paths.container_rootfs(name);
        tracing::info!(
            container = name,
            core = CORE_PACKAGES.len(),
            optional = OPTIONAL_PACKAGES.len(),
            "Installing network testing packages"
        );

        let cmd = CommandSpec::new("chroot")
            .path(&rootfs)
            .args(["/bin/bash", "-c"])
            .arg(install_script())
            .privileged()
            .streaming();

        self.executor
            .run(&cmd)
            .await
            .map_err(|e| LabError::PackageInstall {
                container: name.to_string(),
                source: Box::new(e),
            })?;

        tracing::info!(container = name, "Packages installed");
        Ok(())
    }
}

/// The shell script run inside the rootfs.
#[must_use]
pub fn install_script() -> String {
    let mut script = String::from(
        "set -e -o pipefail\n\
         export DEBIAN_FRONTEND=noninteractive\n\
         export LC_ALL=C\n\
         export LANG=C\n\
         apt update\n\
         apt install -y software-properties-common\n\
         add-apt-repository universe -y\n\
         apt update\n",
    );

    script.push_str(&format!("apt install -y {}\n", CORE_PACKAGES.join(" ")));
    script.push_str("locale-gen en_US.UTF-8\nupdate-locale LANG=en_US.UTF-8\n");

    for pkg in OPTIONAL_PACKAGES {
        script.push_str(&format!(
            "apt install -y {pkg} || echo \"{pkg} not available, skipping\"\n"
        ));
    }

    script.push_str(
        "if [ -f /lib/systemd/system/frr.service ] || [ -f /usr/lib/systemd/system/frr.service ]; then\n\
         \x20   systemctl enable frr || echo \"could not enable frr\"\n\
         fi\n\
         apt clean\n\
         rm -rf /var/lib/apt/lists/*\n",
    );
    script
}
