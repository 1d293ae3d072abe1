//! Container entry point.

use crate::spec::ContainerSpec;

/// Init script location, relative to the rootfs.
pub const INIT_SCRIPT_PATH: &str = "usr/local/bin/container-init";

/// Render the PID 1 script.
///
/// The script configures addressing and routing, starts FRR and sshd, then
/// replaces itself with an interactive shell that keeps the container alive.
pub fn render(spec: &ContainerSpec) -> String {
    let name = spec.name();
    let mgmt = spec.management_interface().name();
    let test = spec.test_interface();
    let mut out = String::new();

    out.push_str(&format!(
        "#!/bin/bash\n# Container initialization script for {name}\n\necho \"Initializing container {name}...\"\n\n"
    ));

    out.push_str("# Configure management interface\n");
    out.push_str(&format!("ip addr add {} dev {mgmt}\n", spec.management_address()));
    out.push_str(&format!("ip link set {mgmt} up\n\n"));

    if spec.vlans().is_empty() {
        if let Some(address) = test.address() {
            out.push_str("# Configure test interface\n");
            out.push_str(&format!("ip addr add {address} dev {}\n\n", test.name()));
        }
    } else {
        out.push_str("# Configure VLAN interfaces\n");
        for vlan in spec.vlans() {
            let iface = spec.vlan_interface(vlan);
            out.push_str(&format!("echo \"Configuring VLAN {} interface...\"\n", vlan.id()));
            out.push_str(&format!(
                "ip link add link {} name {iface} type vlan id {}\n",
                test.name(),
                vlan.id()
            ));
            out.push_str(&format!("ip addr add {} dev {iface}\n", vlan.address()));
            out.push_str(&format!("ip link set {iface} up\n"));
        }
        out.push('\n');
    }

    out.push_str("# Bring up base test interface\n");
    out.push_str(&format!("ip link set {} up\n\n", test.name()));

    out.push_str("# Add default route\n");
    out.push_str(&format!("ip route add default via {} dev {mgmt}\n\n", spec.gateway()));

    out.push_str(
        r#"echo "Network configuration complete:"
ip addr show

# Start FRR
if service frr start; then
    echo "FRR started"
else
    echo "Starting zebra manually"
    /usr/lib/frr/zebra -d -f /etc/frr/zebra.conf || echo "Zebra not available"
fi

# Start SSH daemon
service ssh start
echo "SSH daemon started"

"#,
    );
    out.push_str(&format!("echo \"Container {name} initialized successfully\"\n\n"));
    out.push_str("exec /bin/bash\n");
    out
}
