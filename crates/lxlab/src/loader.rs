//! Container definitions file parsing.
//!
//! ```yaml
//! containers:
//!   H1:
//!     name: H1
//!     management_interface:
//!       name: eth0
//!       ip_address: 192.168.12.141
//!       netmask: "24"
//!       bridge: BR_ND_DATA
//!       mac_address: "00:00:41:00:00:01"
//!     test_interface:
//!       name: eth1
//!       ip_address: 11.1.2.141
//!       netmask: "24"
//!       bridge: BR_L1_H1
//!       mac_address: "00:00:41:00:00:02"
//!     vlans: []
//!     gateway_ip: 192.168.12.1
//! ```

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

use lxlab_common::{LabError, LabResult};
use serde::{Deserialize, Serialize};

use crate::spec::{ContainerSpec, InterfaceAddress, NetworkInterface, VlanConfig};

/// Parsed container definitions file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecFile {
    /// Container definitions by key.
    pub containers: BTreeMap<String, ContainerEntry>,
}

/// One container definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerEntry {
    /// Container name; defaults to the map key.
    #[serde(default)]
    pub name: Option<String>,
    /// Management interface.
    pub management_interface: InterfaceEntry,
    /// Test interface.
    pub test_interface: InterfaceEntry,
    /// VLANs on the test interface.
    #[serde(default)]
    pub vlans: Vec<VlanEntry>,
    /// Default gateway.
    pub gateway_ip: Ipv4Addr,
    /// Memory size in KiB.
    #[serde(default)]
    pub memory_kb: Option<u64>,
    /// Virtual CPU count.
    #[serde(default)]
    pub vcpus: Option<u32>,
}

/// Interface definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceEntry {
    /// Interface name inside the container.
    pub name: String,
    /// IPv4 address; empty means none.
    #[serde(default)]
    pub ip_address: String,
    /// Netmask as prefix length or dotted quad.
    #[serde(default)]
    pub netmask: Option<Netmask>,
    /// Host bridge.
    pub bridge: String,
    /// MAC address.
    pub mac_address: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
}

/// VLAN definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanEntry {
    /// VLAN id.
    pub vlan_id: u32,
    /// IPv4 address of the sub-interface.
    pub ip_address: Ipv4Addr,
    /// Netmask as prefix length or dotted quad.
    pub netmask: Netmask,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
}

/// Netmask written either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Netmask {
    /// Prefix length, e.g. `24`.
    Prefix(u8),
    /// `"24"` or `"255.255.255.0"`; empty means none.
    Text(String),
}

impl Netmask {
    /// Prefix length, or `None` for an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] for anything that is neither a prefix
    /// length nor a contiguous dotted-quad mask.
    pub fn prefix(&self) -> LabResult<Option<u8>> {
        match self {
            Self::Prefix(p) => Ok(Some(*p)),
            Self::Text(t) if t.trim().is_empty() => Ok(None),
            Self::Text(t) => {
                let t = t.trim().trim_start_matches('/');
                if let Ok(p) = t.parse::<u8>() {
                    return Ok(Some(p));
                }
                let mask: Ipv4Addr = t
                    .parse()
                    .map_err(|_| LabError::validation(format!("Invalid netmask {t:?}")))?;
                let bits = u32::from(mask);
                if bits.leading_ones() + bits.trailing_zeros() != 32 {
                    return Err(LabError::validation(format!(
                        "Netmask {t} is not contiguous"
                    )));
                }
                #[allow(clippy::cast_possible_truncation)]
                Ok(Some(bits.leading_ones() as u8))
            }
        }
    }
}

impl InterfaceEntry {
    fn address(&self) -> LabResult<Option<InterfaceAddress>> {
        let ip = self.ip_address.trim();
        let prefix = match &self.netmask {
            Some(mask) => mask.prefix()?,
            None => None,
        };
        if ip.is_empty() {
            return Ok(None);
        }
        let ip: Ipv4Addr = ip.parse().map_err(|_| {
            LabError::validation(format!(
                "Interface {} has an invalid IP address {ip:?}",
                self.name
            ))
        })?;
        let prefix = prefix.ok_or_else(|| {
            LabError::validation(format!(
                "Interface {} has an IP address but no netmask",
                self.name
            ))
        })?;
        InterfaceAddress::new(ip, prefix).map(Some)
    }

    fn to_interface(&self) -> LabResult<NetworkInterface> {
        let mut iface = NetworkInterface::new(&self.name, &self.bridge, &self.mac_address)
            .with_description(&self.description);
        if let Some(address) = self.address()? {
            iface = iface.with_address(address);
        }
        Ok(iface)
    }
}

impl ContainerEntry {
    /// Build the validated specification for this entry.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] if any field is malformed or the
    /// specification invariants do not hold.
    pub fn to_spec(&self, key: &str) -> LabResult<ContainerSpec> {
        let name = self.name.as_deref().unwrap_or(key);
        let mut builder = ContainerSpec::builder(name)
            .management_interface(self.management_interface.to_interface()?)
            .test_interface(self.test_interface.to_interface()?)
            .gateway(self.gateway_ip);
        for vlan in &self.vlans {
            let prefix = vlan.netmask.prefix()?.ok_or_else(|| {
                LabError::validation(format!("VLAN {} has no netmask", vlan.vlan_id))
            })?;
            let address = InterfaceAddress::new(vlan.ip_address, prefix)?;
            builder = builder.vlan(VlanConfig::new(vlan.vlan_id, address, &vlan.description)?);
        }
        if let Some(memory_kb) = self.memory_kb {
            builder = builder.memory_kb(memory_kb);
        }
        if let Some(vcpus) = self.vcpus {
            builder = builder.vcpus(vcpus);
        }
        builder.build()
    }
}

impl SpecFile {
    /// Load a definitions file.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> LabResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LabError::config(format!(
                "Configuration file not found: {}: {e}",
                path.display()
            ))
        })?;
        let file = Self::parse(&contents)?;
        tracing::debug!(path = %path.display(), containers = file.containers.len(), "Loaded container definitions");
        Ok(file)
    }

    /// Parse a definitions document.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Config`] if the document is not valid.
    pub fn parse(contents: &str) -> LabResult<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| LabError::config(format!("Invalid container definitions: {e}")))
    }

    /// Keys of all defined containers, sorted.
    #[must_use]
    pub fn container_names(&self) -> Vec<&str> {
        self.containers.keys().map(String::as_str).collect()
    }

    /// Validated specification of the container with key `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Config`] for an unknown name, or
    /// [`LabError::Validation`] for an invalid definition.
    pub fn container_spec(&self, name: &str) -> LabResult<ContainerSpec> {
        let entry = self.containers.get(name).ok_or_else(|| {
            LabError::config(format!(
                "Container '{name}' not found in configuration. Available: {}",
                self.container_names().join(", ")
            ))
        })?;
        entry.to_spec(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITIONS: &str = r#"
containers:
  H1:
    name: H1
    management_interface:
      name: eth0
      ip_address: 192.168.12.141
      netmask: "24"
      bridge: BR_ND_DATA
      mac_address: "00:00:41:00:00:01"
      description: Management Interface
    test_interface:
      name: eth1
      ip_address: 11.1.2.141
      netmask: 24
      bridge: BR_L1_H1
      mac_address: "00:00:41:00:00:02"
    vlans: []
    gateway_ip: 192.168.12.1
  H2:
    management_interface:
      name: eth0
      ip_address: 192.168.12.142
      netmask: 255.255.255.0
      bridge: BR_ND_DATA
      mac_address: "00:00:42:00:00:01"
    test_interface:
      name: eth1
      ip_address: ""
      netmask: ""
      bridge: BR_L2_H2
      mac_address: "00:00:42:00:00:02"
    vlans:
      - vlan_id: 10
        ip_address: 10.10.10.142
        netmask: "24"
        description: Data VLAN
      - vlan_id: 20
        ip_address: 10.20.20.142
        netmask: "24"
    gateway_ip: 192.168.12.1
    memory_kb: 524288
    vcpus: 1
"#;

    #[test]
    fn lists_container_names() {
        let file = SpecFile::parse(DEFINITIONS).unwrap();
        assert_eq!(file.container_names(), vec!["H1", "H2"]);
    }

    #[test]
    fn access_mode_container() {
        let spec = SpecFile::parse(DEFINITIONS)
            .unwrap()
            .container_spec("H1")
            .unwrap();
        assert_eq!(spec.name(), "H1");
        assert!(spec.vlans().is_empty());
        assert_eq!(
            spec.test_interface().address().unwrap().to_string(),
            "11.1.2.141/24"
        );
        assert_eq!(spec.management_interface().description(), "Management Interface");
    }

    #[test]
    fn trunk_mode_container() {
        let spec = SpecFile::parse(DEFINITIONS)
            .unwrap()
            .container_spec("H2")
            .unwrap();
        // Name falls back to the key.
        assert_eq!(spec.name(), "H2");
        assert_eq!(spec.vlan_ids(), vec![10, 20]);
        assert!(spec.test_interface().address().is_none());
        assert_eq!(spec.management_address().to_string(), "192.168.12.142/24");
        assert_eq!(spec.memory_kb(), 524_288);
        assert_eq!(spec.vcpus(), 1);
    }

    #[test]
    fn unknown_container_lists_available() {
        let err = SpecFile::parse(DEFINITIONS)
            .unwrap()
            .container_spec("H9")
            .unwrap_err();
        assert!(err.to_string().contains("Available: H1, H2"));
    }

    #[test]
    fn address_without_netmask_is_rejected() {
        let entry: InterfaceEntry = serde_yaml::from_str(
            "name: eth1\nip_address: 11.1.2.141\nbridge: br0\nmac_address: \"00:00:00:00:00:01\"\n",
        )
        .unwrap();
        assert!(entry.address().is_err());
    }

    #[test]
    fn netmask_forms() {
        assert_eq!(Netmask::Prefix(16).prefix().unwrap(), Some(16));
        assert_eq!(Netmask::Text("/8".into()).prefix().unwrap(), Some(8));
        assert_eq!(
            Netmask::Text("255.255.252.0".into()).prefix().unwrap(),
            Some(22)
        );
        assert_eq!(Netmask::Text(String::new()).prefix().unwrap(), None);
        assert!(Netmask::Text("255.0.255.0".into()).prefix().is_err());
    }

    #[test]
    fn invalid_yaml_is_config_error() {
        let err = SpecFile::parse("containers: [").unwrap_err();
        assert!(matches!(err, LabError::Config { .. }));
    }
}
