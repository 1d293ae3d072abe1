//! Linux bridge VLAN management.
//!
//! This module toggles VLAN-aware filtering on an existing host bridge and
//! attaches VLAN ids to the bridge's own port (`self`).

use std::sync::Arc;

use lxlab_common::{CommandExecutor, CommandSpec, LabError, LabResult};

/// Configures VLAN membership of host bridges.
pub struct BridgeVlanManager {
    executor: Arc<dyn CommandExecutor>,
}

impl BridgeVlanManager {
    /// Create a manager running commands through `executor`.
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Enable VLAN filtering on the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Bridge`] if the `ip` call fails.
    pub async fn enable_vlan_filtering(&self, bridge: &str) -> LabResult<()> {
        self.set_vlan_filtering(bridge, true).await?;
        tracing::info!(bridge, "Enabled VLAN filtering");
        Ok(())
    }

    /// Disable VLAN filtering on the bridge.
    ///
    /// Succeeds when filtering is already disabled.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Bridge`] if the `ip` call fails.
    pub async fn disable_vlan_filtering(&self, bridge: &str) -> LabResult<()> {
        self.set_vlan_filtering(bridge, false).await?;
        tracing::info!(bridge, "Disabled VLAN filtering");
        Ok(())
    }

    async fn set_vlan_filtering(&self, bridge: &str, enabled: bool) -> LabResult<()> {
        tracing::debug!(bridge, enabled, "Setting VLAN filtering");

        // ip link set <bridge> type bridge vlan_filtering <0|1>
        let cmd = CommandSpec::new("ip")
            .args(["link", "set", bridge, "type", "bridge", "vlan_filtering"])
            .arg(if enabled { "1" } else { "0" })
            .privileged();

        self.executor
            .run(&cmd)
            .await
            .map_err(|e| LabError::Bridge {
                bridge: bridge.to_string(),
                vlan: None,
                source: Box::new(e),
            })?;
        Ok(())
    }

    /// Add a VLAN to the bridge's own port.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Bridge`] naming the bridge and VLAN id if the
    /// `bridge` call fails.
    pub async fn add_vlan(&self, bridge: &str, vlan_id: u16) -> LabResult<()> {
        // bridge vlan add vid <id> dev <bridge> self
        let cmd = CommandSpec::new("bridge")
            .args(["vlan", "add", "vid"])
            .arg(vlan_id.to_string())
            .args(["dev", bridge, "self"])
            .privileged();

        self.executor
            .run(&cmd)
            .await
            .map_err(|e| LabError::Bridge {
                bridge: bridge.to_string(),
                vlan: Some(vlan_id),
                source: Box::new(e),
            })?;

        tracing::info!(bridge, vlan_id, "Added VLAN to bridge");
        Ok(())
    }

    /// Configure the bridge for the given VLAN ids.
    ///
    /// With no ids, VLAN filtering is disabled. Otherwise filtering is
    /// enabled and every id is added; the first failing add aborts and
    /// previously added VLANs stay in place.
    ///
    /// # Errors
    ///
    /// Returns the first [`LabError::Bridge`] encountered.
    pub async fn configure_bridge_vlans(&self, bridge: &str, vlan_ids: &[u16]) -> LabResult<()> {
        if vlan_ids.is_empty() {
            tracing::info!(bridge, "No VLANs configured, disabling VLAN filtering");
            return self.disable_vlan_filtering(bridge).await;
        }

        self.enable_vlan_filtering(bridge).await?;

        let mut added = Vec::with_capacity(vlan_ids.len());
        for &vlan_id in vlan_ids {
            if added.contains(&vlan_id) {
                continue;
            }
            self.add_vlan(bridge, vlan_id).await?;
            added.push(vlan_id);
        }

        Ok(())
    }
}
