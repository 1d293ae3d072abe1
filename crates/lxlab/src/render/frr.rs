//! FRR configuration.

use crate::spec::ContainerSpec;

/// Daemon selection file, relative to the rootfs.
pub const DAEMONS_PATH: &str = "etc/frr/daemons";
/// zebra configuration file, relative to the rootfs.
pub const ZEBRA_CONF_PATH: &str = "etc/frr/zebra.conf";

/// Daemons disabled in every container.
const DISABLED_DAEMONS: &[&str] = &[
    "ospfd", "bgpd", "ripd", "ripngd", "isisd", "pimd", "ldpd", "nhrpd", "eigrpd", "babeld",
    "sharpd", "pbrd", "bfdd", "fabricd",
];

/// Enable zebra only.
pub fn daemons() -> String {
    let mut out = String::from("zebra=yes\n");
    for daemon in DISABLED_DAEMONS {
        out.push_str(&format!("{daemon}=no\n"));
    }
    out
}

pub fn zebra_conf(spec: &ContainerSpec) -> String {
    let mgmt = spec.management_interface();
    let mut out = String::new();

    out.push_str("! Zebra configuration\n");
    out.push_str(&format!("hostname {}\n", spec.name()));
    out.push_str("password zebra\nenable password zebra\n!\n");

    out.push_str("! Management interface\n");
    out.push_str(&format!("interface {}\n", mgmt.name()));
    if !mgmt.description().is_empty() {
        out.push_str(&format!(" description {}\n", mgmt.description()));
    }
    out.push_str(&format!(" ip address {}\n", spec.management_address()));
    out.push_str("!\n");

    for vlan in spec.vlans() {
        out.push_str(&format!("! VLAN {} interface\n", vlan.id()));
        out.push_str(&format!("interface {}\n", spec.vlan_interface(vlan)));
        if !vlan.description().is_empty() {
            out.push_str(&format!(" description {}\n", vlan.description()));
        }
        out.push_str(&format!(" ip address {}\n", vlan.address()));
        out.push_str("!\n");
    }

    out.push_str("! Static routes\n");
    out.push_str(&format!("ip route 0.0.0.0/0 {}\n", spec.gateway()));
    out.push_str("!\nlog file /var/log/frr/zebra.log\n!\nline vty\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::fixtures::{h1, h2};

    #[test]
    fn only_zebra_enabled() {
        let daemons = daemons();
        assert_eq!(daemons.lines().filter(|l| l.ends_with("=yes")).count(), 1);
        assert!(daemons.starts_with("zebra=yes\n"));
        assert!(daemons.contains("bgpd=no\n"));
        assert!(daemons.contains("fabricd=no\n"));
    }

    #[test]
    fn zebra_without_vlans() {
        let conf = zebra_conf(&h1());
        assert!(conf.contains("hostname H1\n"));
        assert!(conf.contains("interface eth0\n description Management Interface\n ip address 192.168.12.141/24\n"));
        assert!(!conf.contains("interface eth1"));
        assert!(conf.contains("ip route 0.0.0.0/0 192.168.12.1\n"));
        assert!(conf.ends_with("line vty\n"));
    }

    #[test]
    fn zebra_with_vlans() {
        let conf = zebra_conf(&h2());
        assert!(conf.contains("interface eth1.10\n description Data VLAN\n ip address 10.10.10.142/24\n"));
        assert!(conf.contains("interface eth1.20\n description Voice VLAN\n ip address 10.20.20.142/24\n"));
        assert!(conf.find("eth1.10").unwrap() < conf.find("eth1.20").unwrap());
    }
}
