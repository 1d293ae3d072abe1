//! Container provisioning pipeline.
//!
//! Stages run strictly in order. A failing stage aborts the run without
//! undoing earlier stages; re-running starts over and relies on each
//! stage being safe to repeat.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lxlab_common::{CommandExecutor, LabError, LabResult};
use lxlab_network::BridgeVlanManager;

use crate::config::ProvisionConfig;
use crate::libvirt::{DomainRegistrar, DomainXmlGenerator};
use crate::packages::PackageInstaller;
use crate::render::Artifact;
use crate::rootfs::RootfsBuilder;
use crate::spec::ContainerSpec;
use crate::summary::ProvisionSummary;

/// Provisioning stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionStage {
    /// VLAN filtering and membership set on the test bridge.
    BridgeConfigured,
    /// Container and rootfs directories exist.
    DirectoriesCreated,
    /// Rootfs bootstrapped.
    RootfsBuilt,
    /// Packages installed into the rootfs.
    PackagesInstalled,
    /// Configuration artifacts written.
    ConfigsGenerated,
    /// Domain XML rendered to a temporary file.
    DomainDescriptorWritten,
    /// Domain defined with libvirt.
    DomainRegistered,
}

impl ProvisionStage {
    /// Every stage, in execution order.
    pub const ALL: [Self; 7] = [
        Self::BridgeConfigured,
        Self::DirectoriesCreated,
        Self::RootfsBuilt,
        Self::PackagesInstalled,
        Self::ConfigsGenerated,
        Self::DomainDescriptorWritten,
        Self::DomainRegistered,
    ];

    /// Stage name used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BridgeConfigured => "configure-bridge",
            Self::DirectoriesCreated => "create-directories",
            Self::RootfsBuilt => "build-rootfs",
            Self::PackagesInstalled => "install-packages",
            Self::ConfigsGenerated => "generate-configs",
            Self::DomainDescriptorWritten => "write-domain-xml",
            Self::DomainRegistered => "define-domain",
        }
    }
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives a container through every provisioning stage.
pub struct Orchestrator {
    config: ProvisionConfig,
    executor: Arc<dyn CommandExecutor>,
    bridges: BridgeVlanManager,
    rootfs: RootfsBuilder,
    packages: PackageInstaller,
    xml: DomainXmlGenerator,
    registrar: DomainRegistrar,
}

impl Orchestrator {
    /// Create an orchestrator running commands through `executor`.
    pub fn new(config: ProvisionConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        let xml = if config.dry_run {
            DomainXmlGenerator::new().skip_emulator_check()
        } else {
            DomainXmlGenerator::new()
        };
        Self {
            bridges: BridgeVlanManager::new(executor.clone()),
            rootfs: RootfsBuilder::new(
                executor.clone(),
                config.paths.clone(),
                config.bootstrap.clone(),
            ),
            packages: PackageInstaller::new(executor.clone(), config.paths.clone()),
            registrar: DomainRegistrar::new(executor.clone(), config.libvirt_uri.clone()),
            xml,
            executor,
            config,
        }
    }

    /// Use a custom domain XML generator.
    #[must_use]
    pub fn with_xml_generator(mut self, xml: DomainXmlGenerator) -> Self {
        self.xml = xml;
        self
    }

    /// Provisioning configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Provision `spec` from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Stage`] naming the failed stage and container,
    /// wrapping the underlying failure.
    pub async fn create_container(&self, spec: &ContainerSpec) -> LabResult<ProvisionSummary> {
        let name = spec.name();
        let rootfs = self.config.paths.container_rootfs(name);
        let mut timings = Vec::with_capacity(ProvisionStage::ALL.len());
        tracing::info!(container = name, dry_run = self.config.dry_run, "Creating container");

        run_stage(ProvisionStage::BridgeConfigured, name, &mut timings, async {
            self.bridges
                .configure_bridge_vlans(spec.test_interface().bridge(), &spec.vlan_ids())
                .await
        })
        .await?;

        run_stage(ProvisionStage::DirectoriesCreated, name, &mut timings, async {
            self.config
                .paths
                .create_container_dirs(self.executor.as_ref(), name)
                .await
        })
        .await?;

        let bootstrap = run_stage(ProvisionStage::RootfsBuilt, name, &mut timings, async {
            self.rootfs.create_default_rootfs(name).await
        })
        .await?;

        run_stage(ProvisionStage::PackagesInstalled, name, &mut timings, async {
            self.packages.install_packages(name).await
        })
        .await?;

        run_stage(ProvisionStage::ConfigsGenerated, name, &mut timings, async {
            for artifact in Artifact::ALL {
                artifact
                    .generate(spec, &rootfs, self.executor.as_ref())
                    .await?;
            }
            Ok::<_, LabError>(())
        })
        .await?;

        // Removed when dropped at the end of this call.
        let descriptor = run_stage(
            ProvisionStage::DomainDescriptorWritten,
            name,
            &mut timings,
            async {
                let file = tempfile::Builder::new()
                    .prefix(&format!("{name}-"))
                    .suffix(".xml")
                    .tempfile()?;
                self.xml.generate_xml(spec, &rootfs, file.path())?;
                Ok::<_, LabError>(file)
            },
        )
        .await?;

        run_stage(ProvisionStage::DomainRegistered, name, &mut timings, async {
            self.registrar.undefine(name).await;
            self.registrar.define(name, descriptor.path()).await
        })
        .await?;

        tracing::info!(container = name, "Container created successfully");
        Ok(ProvisionSummary {
            spec: spec.clone(),
            rootfs,
            libvirt_uri: self.config.libvirt_uri.clone(),
            bootstrap,
            timings,
        })
    }
}

async fn run_stage<T>(
    stage: ProvisionStage,
    container: &str,
    timings: &mut Vec<(ProvisionStage, Duration)>,
    work: impl Future<Output = LabResult<T>>,
) -> LabResult<T> {
    tracing::info!(container, %stage, "Starting stage");
    let started = Instant::now();
    match work.await {
        Ok(value) => {
            let elapsed = started.elapsed();
            tracing::debug!(container, %stage, elapsed_s = elapsed.as_secs_f64(), "Stage complete");
            timings.push((stage, elapsed));
            Ok(value)
        }
        Err(e) => {
            tracing::error!(container, %stage, error = %e, "Stage failed");
            Err(e.in_stage(stage, container))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::fixtures::h1;
    use lxlab_common::testing::RecordingExecutor;

    fn orchestrator(exec: &Arc<RecordingExecutor>, root: &std::path::Path) -> Orchestrator {
        Orchestrator::new(ProvisionConfig::default().with_root(root), exec.clone())
            .with_xml_generator(DomainXmlGenerator::new().skip_emulator_check())
    }

    #[test]
    fn stage_names() {
        let names: Vec<_> = ProvisionStage::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names[0], "configure-bridge");
        assert_eq!(names[6], "define-domain");
    }

    #[test_log::test(tokio::test)]
    async fn records_every_stage() {
        let temp = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::new());

        let summary = orchestrator(&exec, temp.path())
            .create_container(&h1())
            .await
            .unwrap();

        let stages: Vec<_> = summary.timings.iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, ProvisionStage::ALL);
        assert_eq!(summary.rootfs, temp.path().join("H1/rootfs"));
    }

    #[tokio::test]
    async fn failure_names_stage_and_stops() {
        let temp = tempfile::tempdir().unwrap();
        let exec = Arc::new(RecordingExecutor::new().fail_always("chroot"));

        let err = orchestrator(&exec, temp.path())
            .create_container(&h1())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Provisioning of H1 failed at stage install-packages"
        );
        assert!(matches!(
            err,
            LabError::Stage { ref source, .. } if matches!(**source, LabError::PackageInstall { .. })
        ));
        assert_eq!(exec.count_matching("tee"), 0);
        assert_eq!(exec.count_matching("virsh"), 0);
    }

    #[tokio::test]
    async fn directories_created_through_executor() {
        let exec = Arc::new(RecordingExecutor::new());

        orchestrator(&exec, std::path::Path::new("/var/lib/lxc"))
            .create_container(&h1())
            .await
            .unwrap();

        let mkdir = exec
            .calls()
            .into_iter()
            .find(|c| c.command_line() == "mkdir -p /var/lib/lxc/H1 /var/lib/lxc/H1/rootfs")
            .unwrap();
        assert!(mkdir.privileged);
        assert!(
            exec.position("mkdir -p /var/lib/lxc/H1 ").unwrap()
                < exec.position("debootstrap").unwrap()
        );
    }

    #[tokio::test]
    async fn directory_failure_names_stage() {
        let exec = Arc::new(RecordingExecutor::new().fail_always("/H1/rootfs"));
        let temp = tempfile::tempdir().unwrap();

        let err = orchestrator(&exec, temp.path())
            .create_container(&h1())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Provisioning of H1 failed at stage create-directories"
        );
        assert_eq!(exec.count_matching("debootstrap"), 0);
    }

    #[tokio::test]
    async fn dry_run_leaves_filesystem_alone() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("lxc");
        let exec = Arc::new(RecordingExecutor::new());

        Orchestrator::new(
            ProvisionConfig::default().with_root(&root).with_dry_run(true),
            exec.clone(),
        )
        .create_container(&h1())
        .await
        .unwrap();

        assert!(!root.exists());
        assert_eq!(exec.count_matching("virsh -c lxc:/// define"), 1);
    }
}
