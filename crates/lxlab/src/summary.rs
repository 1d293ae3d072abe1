//! Post-provisioning report.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::ProvisionStage;
use crate::rootfs::BootstrapReport;
use crate::spec::ContainerSpec;

/// What a successful provisioning run produced.
#[derive(Debug, Clone)]
pub struct ProvisionSummary {
    /// The provisioned container.
    pub spec: ContainerSpec,
    /// Root filesystem location.
    pub rootfs: PathBuf,
    /// libvirt connection the domain was defined on.
    pub libvirt_uri: String,
    /// Rootfs bootstrap statistics.
    pub bootstrap: BootstrapReport,
    /// Wall-clock time per stage, in execution order.
    pub timings: Vec<(ProvisionStage, Duration)>,
}

impl ProvisionSummary {
    /// Total wall-clock time.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.timings.iter().map(|(_, d)| *d).sum()
    }
}

impl fmt::Display for ProvisionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spec = &self.spec;
        let name = spec.name();
        let mgmt = spec.management_interface();
        let test = spec.test_interface();
        let rule = "=".repeat(50);

        writeln!(f, "{rule}")?;
        writeln!(f, "Container '{name}' created successfully!")?;
        writeln!(f, "{rule}")?;

        writeln!(f, "\nNetwork Configuration:")?;
        writeln!(
            f,
            "  {}: {} -> {} (Management)",
            mgmt.name(),
            spec.management_address(),
            mgmt.bridge()
        )?;
        if spec.vlans().is_empty() {
            if let Some(address) = test.address() {
                writeln!(f, "  {}: {address} -> {} (Direct)", test.name(), test.bridge())?;
            }
            writeln!(f, "\nBridge Configuration:")?;
            writeln!(f, "  Bridge {} configured without VLANs", test.bridge())?;
        } else {
            for vlan in spec.vlans() {
                writeln!(
                    f,
                    "  {}: {} -> {} (VLAN {})",
                    spec.vlan_interface(vlan),
                    vlan.address(),
                    test.bridge(),
                    vlan.id()
                )?;
            }
            let ids: Vec<String> = spec.vlan_ids().iter().map(ToString::to_string).collect();
            writeln!(f, "\nBridge VLAN Configuration:")?;
            writeln!(
                f,
                "  Bridge {} configured with VLANs: {}",
                test.bridge(),
                ids.join(", ")
            )?;
        }

        let uri = &self.libvirt_uri;
        writeln!(f, "\nContainer Management:")?;
        writeln!(f, "  Start:   sudo virsh -c {uri} start {name}")?;
        writeln!(f, "  Console: sudo virsh -c {uri} console {name}")?;
        writeln!(f, "  Stop:    sudo virsh -c {uri} shutdown {name}")?;
        writeln!(f, "  Status:  sudo virsh -c {uri} list")?;

        writeln!(f, "\nNetwork Testing (inside container):")?;
        writeln!(f, "  network-test show-config     - Show configuration")?;
        writeln!(f, "  network-test mgmt-ping <ip>  - Ping via management")?;
        if spec.vlans().is_empty() {
            writeln!(f, "  network-test test-ping <ip>  - Ping via test interface")?;
        }
        for vlan in spec.vlans() {
            let id = vlan.id();
            writeln!(f, "  network-test vlan{id}-ping <ip> - Ping via VLAN {id}")?;
        }
        writeln!(f, "  network-test zebra-cli       - Access FRR/Zebra CLI")?;
        writeln!(f, "  network-test show-vlans      - Show VLAN interfaces")?;

        writeln!(f, "\nRootfs: {}", self.rootfs.display())?;
        if self.bootstrap.attempts > 1 {
            writeln!(f, "  Bootstrap needed {} attempts", self.bootstrap.attempts)?;
        }
        writeln!(f, "Completed in {:.1}s", self.total_duration().as_secs_f64())?;

        write!(f, "\nConsole Disconnect: Ctrl + ] (don't use 'exit')")
    }
}
