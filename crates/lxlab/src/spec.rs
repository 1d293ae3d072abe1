//! Container specification model.
//!
//! A [`ContainerSpec`] is validated once when it is built and never changes
//! afterwards; every provisioning stage reads from it.

use std::fmt;
use std::net::Ipv4Addr;

use lxlab_common::{LabError, LabResult};

/// Lowest valid VLAN id.
pub const MIN_VLAN_ID: u32 = 1;
/// Highest valid VLAN id.
pub const MAX_VLAN_ID: u32 = 4094;

/// Default memory size in KiB (1 GiB).
pub const DEFAULT_MEMORY_KB: u64 = 1_048_576;
/// Default virtual CPU count.
pub const DEFAULT_VCPUS: u32 = 2;

/// Linux interface names are limited to 15 bytes.
const MAX_IFNAME_LEN: usize = 15;

/// An IPv4 address with its prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceAddress {
    /// Address.
    pub ip: Ipv4Addr,
    /// Prefix length (0-32).
    pub prefix: u8,
}

impl InterfaceAddress {
    /// Create an address, checking the prefix length.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] if `prefix` exceeds 32.
    pub fn new(ip: Ipv4Addr, prefix: u8) -> LabResult<Self> {
        if prefix > 32 {
            return Err(LabError::validation(format!(
                "Invalid netmask /{prefix} for {ip}"
            )));
        }
        Ok(Self { ip, prefix })
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix)
    }
}

/// One network interface of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    name: String,
    address: Option<InterfaceAddress>,
    bridge: String,
    mac_address: String,
    description: String,
}

impl NetworkInterface {
    /// Create an interface without an address.
    pub fn new(
        name: impl Into<String>,
        bridge: impl Into<String>,
        mac_address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: None,
            bridge: bridge.into(),
            mac_address: mac_address.into(),
            description: String::new(),
        }
    }

    /// Assign an address.
    #[must_use]
    pub const fn with_address(mut self, address: InterfaceAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// Set the free-text description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Interface name inside the container.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directly assigned address, if any.
    #[must_use]
    pub const fn address(&self) -> Option<InterfaceAddress> {
        self.address
    }

    /// Host bridge the interface is attached to.
    #[must_use]
    pub fn bridge(&self) -> &str {
        &self.bridge
    }

    /// MAC address.
    #[must_use]
    pub fn mac_address(&self) -> &str {
        &self.mac_address
    }

    /// Free-text description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    fn validate(&self, role: &str) -> LabResult<()> {
        validate_ifname(&self.name, role)?;
        if self.bridge.is_empty() || self.bridge.chars().any(char::is_whitespace) {
            return Err(LabError::validation(format!(
                "{role} interface {} has an invalid bridge name {:?}",
                self.name, self.bridge
            )));
        }
        if !is_mac_address(&self.mac_address) {
            return Err(LabError::validation(format!(
                "{role} interface {} has an invalid MAC address {:?}",
                self.name, self.mac_address
            )));
        }
        validate_single_line(&self.description, "interface description")
    }
}

/// A VLAN carried on the test interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanConfig {
    id: u16,
    address: InterfaceAddress,
    description: String,
}

impl VlanConfig {
    /// Create a VLAN, checking that the id lies in 1..=4094.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] for an out-of-range id.
    pub fn new(
        id: u32,
        address: InterfaceAddress,
        description: impl Into<String>,
    ) -> LabResult<Self> {
        let id = u16::try_from(id)
            .ok()
            .filter(|v| (MIN_VLAN_ID..=MAX_VLAN_ID).contains(&u32::from(*v)))
            .ok_or_else(|| LabError::validation(format!("Invalid VLAN ID: {id}")))?;
        let description = description.into();
        validate_single_line(&description, "VLAN description")?;
        Ok(Self {
            id,
            address,
            description,
        })
    }

    /// VLAN id.
    #[must_use]
    pub const fn id(&self) -> u16 {
        self.id
    }

    /// Address of the VLAN sub-interface.
    #[must_use]
    pub const fn address(&self) -> InterfaceAddress {
        self.address
    }

    /// Free-text description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Complete description of one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    name: String,
    management: NetworkInterface,
    management_address: InterfaceAddress,
    test: NetworkInterface,
    vlans: Vec<VlanConfig>,
    gateway: Ipv4Addr,
    memory_kb: u64,
    vcpus: u32,
}

impl ContainerSpec {
    /// Start building a specification for `name`.
    pub fn builder(name: impl Into<String>) -> ContainerSpecBuilder {
        ContainerSpecBuilder {
            name: name.into(),
            management: None,
            test: None,
            vlans: Vec::new(),
            gateway: None,
            memory_kb: DEFAULT_MEMORY_KB,
            vcpus: DEFAULT_VCPUS,
        }
    }

    /// Container (and domain) name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Management interface.
    #[must_use]
    pub const fn management_interface(&self) -> &NetworkInterface {
        &self.management
    }

    /// Test interface.
    #[must_use]
    pub const fn test_interface(&self) -> &NetworkInterface {
        &self.test
    }

    /// VLANs in declaration order.
    #[must_use]
    pub fn vlans(&self) -> &[VlanConfig] {
        &self.vlans
    }

    /// VLAN ids in declaration order.
    #[must_use]
    pub fn vlan_ids(&self) -> Vec<u16> {
        self.vlans.iter().map(VlanConfig::id).collect()
    }

    /// Name of the sub-interface carrying `vlan`.
    #[must_use]
    pub fn vlan_interface(&self, vlan: &VlanConfig) -> String {
        format!("{}.{}", self.test.name, vlan.id)
    }

    /// Default gateway.
    #[must_use]
    pub const fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    /// Memory size in KiB.
    #[must_use]
    pub const fn memory_kb(&self) -> u64 {
        self.memory_kb
    }

    /// Virtual CPU count.
    #[must_use]
    pub const fn vcpus(&self) -> u32 {
        self.vcpus
    }

    /// Management address.
    #[must_use]
    pub const fn management_address(&self) -> InterfaceAddress {
        self.management_address
    }
}

/// Builder for [`ContainerSpec`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ContainerSpecBuilder {
    name: String,
    management: Option<NetworkInterface>,
    test: Option<NetworkInterface>,
    vlans: Vec<VlanConfig>,
    gateway: Option<Ipv4Addr>,
    memory_kb: u64,
    vcpus: u32,
}

impl ContainerSpecBuilder {
    /// Set the management interface.
    #[must_use]
    pub fn management_interface(mut self, iface: NetworkInterface) -> Self {
        self.management = Some(iface);
        self
    }

    /// Set the test interface.
    #[must_use]
    pub fn test_interface(mut self, iface: NetworkInterface) -> Self {
        self.test = Some(iface);
        self
    }

    /// Add a VLAN.
    #[must_use]
    pub fn vlan(mut self, vlan: VlanConfig) -> Self {
        self.vlans.push(vlan);
        self
    }

    /// Set the default gateway.
    #[must_use]
    pub const fn gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Set the memory size in KiB.
    #[must_use]
    pub const fn memory_kb(mut self, memory_kb: u64) -> Self {
        self.memory_kb = memory_kb;
        self
    }

    /// Set the virtual CPU count.
    #[must_use]
    pub const fn vcpus(mut self, vcpus: u32) -> Self {
        self.vcpus = vcpus;
        self
    }

    /// Validate and build the specification.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] when:
    /// - the name is empty or not usable as a path component;
    /// - an interface, the gateway, or the sizing is missing or malformed;
    /// - there are no VLANs and the test interface has no address;
    /// - there are VLANs and the test interface has a direct address;
    /// - a VLAN id appears twice.
    pub fn build(self) -> LabResult<ContainerSpec> {
        if self.name.is_empty() {
            return Err(LabError::validation("Container name cannot be empty"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            || self.name.starts_with('.')
        {
            return Err(LabError::validation(format!(
                "Container name {:?} may only contain letters, digits, '-', '_' and '.'",
                self.name
            )));
        }

        let management = self
            .management
            .ok_or_else(|| LabError::validation("Management interface is required"))?;
        let test = self
            .test
            .ok_or_else(|| LabError::validation("Test interface is required"))?;
        let gateway = self
            .gateway
            .ok_or_else(|| LabError::validation("Gateway IP is required"))?;

        management.validate("Management")?;
        test.validate("Test")?;
        let management_address = management.address.ok_or_else(|| {
            LabError::validation("Management interface must have IP address and netmask")
        })?;
        if management.name == test.name {
            return Err(LabError::validation(format!(
                "Management and test interfaces share the name {}",
                test.name
            )));
        }

        if self.vlans.is_empty() {
            if test.address.is_none() {
                return Err(LabError::validation(
                    "When no VLANs are configured, test interface must have IP address and netmask",
                ));
            }
        } else if test.address.is_some() {
            return Err(LabError::validation(
                "When VLANs are configured, test interface should not have direct IP address",
            ));
        }

        let mut seen = Vec::with_capacity(self.vlans.len());
        for vlan in &self.vlans {
            if seen.contains(&vlan.id) {
                return Err(LabError::validation(format!(
                    "VLAN {} is configured twice",
                    vlan.id
                )));
            }
            seen.push(vlan.id);
            validate_ifname(&format!("{}.{}", test.name, vlan.id), "VLAN")?;
        }

        if self.memory_kb == 0 {
            return Err(LabError::validation("Memory size must be positive"));
        }
        if self.vcpus == 0 {
            return Err(LabError::validation("vCPU count must be positive"));
        }

        Ok(ContainerSpec {
            name: self.name,
            management,
            management_address,
            test,
            vlans: self.vlans,
            gateway,
            memory_kb: self.memory_kb,
            vcpus: self.vcpus,
        })
    }
}

fn validate_ifname(name: &str, role: &str) -> LabResult<()> {
    if name.is_empty()
        || name.len() > MAX_IFNAME_LEN
        || name.chars().any(|c| c.is_whitespace() || c == '/')
    {
        return Err(LabError::validation(format!(
            "{role} interface name {name:?} is not a valid Linux interface name"
        )));
    }
    Ok(())
}

fn validate_single_line(text: &str, what: &str) -> LabResult<()> {
    if text.contains(['\n', '\r']) {
        return Err(LabError::validation(format!(
            "{what} must fit on one line: {text:?}"
        )));
    }
    Ok(())
}

fn is_mac_address(mac: &str) -> bool {
    let octets: Vec<&str> = mac.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn addr(ip: &str, prefix: u8) -> InterfaceAddress {
        InterfaceAddress::new(ip.parse().unwrap(), prefix).unwrap()
    }

    pub fn management() -> NetworkInterface {
        NetworkInterface::new("eth0", "BR_ND_DATA", "00:00:41:00:00:01")
            .with_address(addr("192.168.12.141", 24))
            .with_description("Management Interface")
    }

    /// Access-mode host: test address directly on eth1.
    pub fn h1() -> ContainerSpec {
        ContainerSpec::builder("H1")
            .management_interface(management())
            .test_interface(
                NetworkInterface::new("eth1", "BR_L1_H1", "00:00:41:00:00:02")
                    .with_address(addr("11.1.2.141", 24))
                    .with_description("Test Interface"),
            )
            .gateway("192.168.12.1".parse().unwrap())
            .build()
            .unwrap()
    }

    /// Trunk-mode host: VLANs 10 and 20 on eth1.
    pub fn h2() -> ContainerSpec {
        ContainerSpec::builder("H2")
            .management_interface(
                NetworkInterface::new("eth0", "BR_ND_DATA", "00:00:42:00:00:01")
                    .with_address(addr("192.168.12.142", 24))
                    .with_description("Management Interface"),
            )
            .test_interface(NetworkInterface::new("eth1", "BR_L2_H2", "00:00:42:00:00:02"))
            .vlan(VlanConfig::new(10, addr("10.10.10.142", 24), "Data VLAN").unwrap())
            .vlan(VlanConfig::new(20, addr("10.20.20.142", 24), "Voice VLAN").unwrap())
            .gateway("192.168.12.1".parse().unwrap())
            .build()
            .unwrap()
    }
}
