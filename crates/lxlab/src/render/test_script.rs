//! The `network-test` helper.

use crate::spec::ContainerSpec;

/// Helper script location, relative to the rootfs.
pub const TEST_SCRIPT_PATH: &str = "usr/local/bin/network-test";

pub fn render(spec: &ContainerSpec) -> String {
    let mgmt = spec.management_interface();
    let test = spec.test_interface();
    let name = spec.name();
    let mut out = String::new();

    out.push_str(&format!("#!/bin/bash\n# Network testing script for {name}\n\n"));

    // Help text.
    out.push_str("show_help() {\n");
    out.push_str(&format!("    echo \"Network Testing Tools Container - {name}\"\n"));
    out.push_str(
        r#"    echo "Available commands:"
    echo "  ping <target>              - Ping a target"
    echo "  trace <target>             - Tracepath to target"
    echo "  mtr <target>               - MTR (traceroute + ping)"
    echo "  iperf-server [port]        - Start iperf3 server"
    echo "  iperf-client <target>      - Run iperf3 client to target"
    echo "  scan <target>              - Nmap scan target"
    echo "  zebra-cli                  - Connect to zebra CLI"
    echo "  show-routes                - Show routing table"
    echo "  show-interfaces            - Show network interfaces"
    echo "  show-vlans                 - Show VLAN interfaces"
    echo "  traffic-gen <target>       - Generate traffic with hping3"
    echo "  mgmt-ping <target>         - Ping via management interface"
"#,
    );
    for vlan in spec.vlans() {
        let command = format!("vlan{}-ping <target>", vlan.id());
        out.push_str(&format!(
            "    echo \"  {command:<27}- Ping via VLAN {} interface\"\n",
            vlan.id()
        ));
    }
    if spec.vlans().is_empty() {
        out.push_str(&format!(
            "    echo \"  {:<27}- Ping via test interface\"\n",
            "test-ping <target>"
        ));
    }
    out.push_str(
        "    echo \"  show-config                - Show current network configuration\"\n}\n\n",
    );

    // Dispatch.
    out.push_str(
        r#"case "$1" in
    "ping") ping -c 4 "$2" ;;
    "trace") tracepath "$2" ;;
    "mtr") mtr -c 10 "$2" ;;
    "iperf-server")
        PORT="${2:-5201}"
        echo "Starting iperf3 server on port $PORT"
        iperf3 -s -p "$PORT" ;;
    "iperf-client") iperf3 -c "$2" ;;
    "scan") nmap -sP "$2" ;;
    "zebra-cli") vtysh ;;
    "show-routes")
        echo "=== Kernel routing table ==="
        ip route show
        echo ""
        echo "=== FRR routing table ==="
        vtysh -c "show ip route" ;;
    "show-interfaces")
        echo "=== Network interfaces ==="
        ip addr show
        echo ""
        echo "=== Interface statistics ==="
        ip -s link show ;;
    "show-vlans")
        echo "=== VLAN interfaces ==="
"#,
    );
    if spec.vlans().is_empty() {
        out.push_str("        echo \"No VLANs configured\"\n");
    }
    for vlan in spec.vlans() {
        let iface = spec.vlan_interface(vlan);
        out.push_str(&format!(
            "        ip addr show {iface} 2>/dev/null || echo \"{iface} not configured\"\n"
        ));
    }
    out.push_str("        ;;\n");
    out.push_str("    \"traffic-gen\") hping3 -S -p 80 -c 10 \"$2\" ;;\n");
    out.push_str(&format!(
        "    \"mgmt-ping\") ping -I {} -c 4 \"$2\" ;;\n",
        mgmt.name()
    ));
    for vlan in spec.vlans() {
        out.push_str(&format!(
            "    \"vlan{}-ping\") ping -I {} -c 4 \"$2\" ;;\n",
            vlan.id(),
            spec.vlan_interface(vlan)
        ));
    }
    if spec.vlans().is_empty() {
        out.push_str(&format!(
            "    \"test-ping\") ping -I {} -c 4 \"$2\" ;;\n",
            test.name()
        ));
    }

    // Configuration summary.
    out.push_str("    \"show-config\")\n");
    out.push_str("        echo \"=== Container Network Configuration ===\"\n");
    out.push_str(&format!(
        "        echo \"Management Interface ({}): {} -> {}\"\n",
        mgmt.name(),
        spec.management_address(),
        mgmt.bridge()
    ));
    if let Some(address) = test.address() {
        out.push_str(&format!(
            "        echo \"Test Interface ({}): {address} -> {}\"\n",
            test.name(),
            test.bridge()
        ));
    }
    for vlan in spec.vlans() {
        out.push_str(&format!(
            "        echo \"VLAN {} Interface ({}): {} -> {}\"\n",
            vlan.id(),
            spec.vlan_interface(vlan),
            vlan.address(),
            test.bridge()
        ));
    }
    out.push_str(
        r#"        echo ""
        echo "=== Current Interface Status ==="
        ip addr show
        echo ""
        echo "=== Current Routes ==="
        ip route show ;;
    *) show_help ;;
esac
"#,
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::fixtures::{h1, h2};

    #[test]
    fn vlan_ping_per_vlan() {
        let script = render(&h2());
        assert!(script.contains("\"vlan10-ping\") ping -I eth1.10 -c 4 \"$2\" ;;"));
        assert!(script.contains("\"vlan20-ping\") ping -I eth1.20 -c 4 \"$2\" ;;"));
        assert!(!script.contains("test-ping"));
        assert!(script.contains("ip addr show eth1.20 2>/dev/null"));
    }

    #[test]
    fn test_ping_without_vlans() {
        let script = render(&h1());
        assert!(script.contains("\"test-ping\") ping -I eth1 -c 4 \"$2\" ;;"));
        assert!(!script.contains("vlan10-ping"));
        assert!(script.contains("Test Interface (eth1): 11.1.2.141/24 -> BR_L1_H1"));
    }

    #[test]
    fn iperf_port_defaults() {
        let script = render(&h1());
        assert!(script.contains("PORT=\"${2:-5201}\""));
        assert!(!script.contains("$$"));
    }

    #[test]
    fn help_lists_subcommands() {
        let script = render(&h2());
        for cmd in [
            "ping <target>",
            "iperf-server [port]",
            "zebra-cli",
            "show-vlans",
            "mgmt-ping <target>",
            "vlan10-ping <target>",
            "show-config",
        ] {
            assert!(script.contains(&format!("echo \"  {cmd}")), "missing {cmd}");
        }
        assert!(script.starts_with("#!/bin/bash\n# Network testing script for H2\n"));
        assert!(script.ends_with("esac\n"));
    }
}
