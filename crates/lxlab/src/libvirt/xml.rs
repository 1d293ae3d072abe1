//! LXC domain descriptor rendering.

use std::path::{Path, PathBuf};

use lxlab_common::{LabError, LabResult};

use crate::render::INIT_SCRIPT_PATH;
use crate::spec::{ContainerSpec, NetworkInterface};

/// Locations probed for the libvirt LXC emulator.
pub const EMULATOR_CANDIDATES: &[&str] =
    &["/usr/lib/libvirt/libvirt_lxc", "/usr/libexec/libvirt_lxc"];

/// Renders libvirt domain XML for a container.
#[derive(Debug, Clone)]
pub struct DomainXmlGenerator {
    candidates: Vec<PathBuf>,
    require_emulator: bool,
}

impl Default for DomainXmlGenerator {
    fn default() -> Self {
        Self {
            candidates: EMULATOR_CANDIDATES.iter().map(PathBuf::from).collect(),
            require_emulator: true,
        }
    }
}

impl DomainXmlGenerator {
    /// Create a generator probing the standard emulator locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `candidates` instead of the standard locations.
    #[must_use]
    pub fn with_emulator_candidates<I, P>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    /// Fall back to the first candidate when none exists.
    #[must_use]
    pub const fn skip_emulator_check(mut self) -> Self {
        self.require_emulator = false;
        self
    }

    /// First existing emulator candidate.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::MissingDependency`] if no candidate exists and the
    /// check is not skipped.
    pub fn find_emulator(&self) -> LabResult<PathBuf> {
        if let Some(found) = self.candidates.iter().find(|p| p.exists()) {
            return Ok(found.clone());
        }
        match self.candidates.first() {
            Some(first) if !self.require_emulator => {
                tracing::warn!(emulator = %first.display(), "libvirt_lxc emulator not found, assuming default location");
                Ok(first.clone())
            }
            _ => Err(LabError::MissingDependency {
                what: "libvirt_lxc emulator".to_string(),
                hint: Some("sudo apt install libvirt-daemon-driver-lxc".to_string()),
            }),
        }
    }

    /// Render the domain XML.
    #[must_use]
    pub fn render(spec: &ContainerSpec, rootfs: &Path, emulator: &Path) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<domain type='lxc'>\n");
        xml.push_str(&format!("  <name>{}</name>\n", xml_escape(spec.name())));
        xml.push_str(&format!("  <memory unit='KiB'>{}</memory>\n", spec.memory_kb()));
        xml.push_str(&format!(
            "  <currentMemory unit='KiB'>{}</currentMemory>\n",
            spec.memory_kb()
        ));
        xml.push_str(&format!("  <vcpu placement='static'>{}</vcpu>\n", spec.vcpus()));
        xml.push_str(&format!(
            "  <os>\n    <type arch='x86_64'>exe</type>\n    <init>/{INIT_SCRIPT_PATH}</init>\n  </os>\n"
        ));
        xml.push_str(
            "  <clock offset='utc'/>\n  <on_poweroff>restart</on_poweroff>\n  \
             <on_reboot>restart</on_reboot>\n  <on_crash>restart</on_crash>\n  <devices>\n",
        );
        xml.push_str(&format!(
            "    <emulator>{}</emulator>\n",
            xml_escape(&emulator.to_string_lossy())
        ));
        xml.push_str(&format!(
            "    <filesystem type='mount' accessmode='passthrough'>\n      \
             <source dir='{}'/>\n      <target dir='/'/>\n    </filesystem>\n",
            xml_escape(&rootfs.to_string_lossy())
        ));
        bridge_interface(&mut xml, spec.management_interface());
        bridge_interface(&mut xml, spec.test_interface());
        xml.push_str(
            "    <console type='pty'>\n      <target type='lxc' port='0'/>\n    </console>\n  \
             </devices>\n</domain>\n",
        );
        xml
    }

    /// Locate the emulator, render the descriptor and write it to
    /// `output_file`.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::MissingDependency`] without an emulator, or an I/O
    /// error if the file cannot be written.
    pub fn generate_xml(
        &self,
        spec: &ContainerSpec,
        rootfs: &Path,
        output_file: &Path,
    ) -> LabResult<()> {
        let emulator = self.find_emulator()?;
        std::fs::write(output_file, Self::render(spec, rootfs, &emulator))?;
        tracing::info!(container = spec.name(), path = %output_file.display(), "Generated domain XML");
        Ok(())
    }
}

fn bridge_interface(xml: &mut String, iface: &NetworkInterface) {
    xml.push_str(&format!(
        "    <interface type='bridge'>\n      <source bridge='{}'/>\n      \
         <model type='virtio'/>\n      <mac address='{}'/>\n    </interface>\n",
        xml_escape(iface.bridge()),
        xml_escape(iface.mac_address())
    ));
}

/// Escape text for XML content and single- or double-quoted attributes.
#[must_use]
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
