//! Domain registration through `virsh`.

use std::path::Path;
use std::sync::Arc;

use lxlab_common::{CommandExecutor, CommandSpec, LabError, LabResult};

/// Defines and undefines domains on a libvirt connection.
pub struct DomainRegistrar {
    executor: Arc<dyn CommandExecutor>,
    uri: String,
}

impl DomainRegistrar {
    /// Create a registrar for the connection `uri`.
    pub fn new(executor: Arc<dyn CommandExecutor>, uri: impl Into<String>) -> Self {
        Self {
            executor,
            uri: uri.into(),
        }
    }

    fn virsh(&self) -> CommandSpec {
        CommandSpec::new("virsh").args(["-c", self.uri.as_str()]).privileged()
    }

    /// Define (or redefine) the domain `name` from `xml_file`.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Registration`] wrapping the `virsh` failure.
    pub async fn define(&self, name: &str, xml_file: &Path) -> LabResult<()> {
        let cmd = self.virsh().arg("define").path(xml_file);
        self.executor
            .run(&cmd)
            .await
            .map_err(|e| LabError::Registration {
                domain: name.to_string(),
                source: Box::new(e),
            })?;
        tracing::info!(domain = name, xml = %xml_file.display(), "Domain defined");
        Ok(())
    }

    /// Remove any existing definition of `name`.
    ///
    /// Never fails; a missing domain is the common case.
    pub async fn undefine(&self, name: &str) {
        let cmd = self.virsh().arg("undefine").arg(name).unchecked();
        match self.executor.run(&cmd).await {
            Ok(output) if output.success => {
                tracing::info!(domain = name, "Removed previous domain definition");
            }
            Ok(_) => tracing::debug!(domain = name, "No previous domain definition"),
            Err(e) => tracing::debug!(domain = name, error = %e, "virsh undefine failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lxlab_common::testing::RecordingExecutor;

    #[tokio::test]
    async fn undefine_tolerates_missing_domain() {
        let exec = Arc::new(RecordingExecutor::new().fail_always("undefine"));
        let registrar = DomainRegistrar::new(exec.clone(), "lxc:///");

        registrar.undefine("H1").await;

        assert_eq!(exec.command_lines(), vec!["virsh -c lxc:/// undefine H1"]);
    }

    #[tokio::test]
    async fn undefine_tolerates_missing_virsh() {
        let registrar = DomainRegistrar::new(
            Arc::new(lxlab_common::SystemExecutor::without_sudo()),
            "lxc:///",
        );
        // Whether or not virsh is installed, undefine returns normally.
        registrar.undefine("lxlab-no-such-domain").await;
    }

    #[tokio::test]
    async fn define_uses_connection_uri() {
        let exec = Arc::new(RecordingExecutor::new());
        let registrar = DomainRegistrar::new(exec.clone(), "lxc:///system");

        registrar.define("H1", Path::new("/tmp/H1.xml")).await.unwrap();

        let calls = exec.calls();
        assert_eq!(calls[0].command_line(), "virsh -c lxc:///system define /tmp/H1.xml");
        assert!(calls[0].privileged);
    }

    #[tokio::test]
    async fn define_failure_is_registration_error() {
        let exec = Arc::new(RecordingExecutor::new().fail_always("define"));
        let registrar = DomainRegistrar::new(exec, "lxc:///");

        let err = registrar
            .define("H1", Path::new("/tmp/H1.xml"))
            .await
            .unwrap_err();

        assert!(matches!(err, LabError::Registration { ref domain, .. } if domain == "H1"));
        assert_eq!(err.to_string(), "Failed to define domain H1");
    }
}
