//! lxlab CLI.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use console::style;
use lxlab_common::{CommandExecutor, DryRunExecutor, LabError, SystemExecutor};
use tabled::{Table, Tabled};

use crate::config::{DEFAULT_LIBVIRT_URI, ProvisionConfig};
use crate::loader::SpecFile;
use crate::orchestrator::Orchestrator;
use crate::render::write_local;
use crate::requirements::RequirementsChecker;

/// lxlab - Provision VLAN-attached LXC network-test containers
#[derive(Parser)]
#[command(name = "lxlab")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Container definitions file
    #[arg(short, long, env = "LXLAB_CONFIG", default_value = "containers.yaml", global = true)]
    pub config: PathBuf,

    /// Base directory for container trees
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// libvirt connection URI
    #[arg(long, default_value = DEFAULT_LIBVIRT_URI, global = true)]
    pub uri: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log commands instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Never escalate privileged commands through sudo
    #[arg(long, global = true)]
    pub no_sudo: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// lxlab commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Check that required host tools and the libvirt LXC driver are present
    Check,

    /// List containers defined in the configuration file
    List,

    /// Provision a container
    Create {
        /// Container name
        name: String,

        /// Package mirror for the rootfs bootstrap
        #[arg(long)]
        mirror: Option<String>,

        /// Bootstrap attempts before giving up
        #[arg(long)]
        attempts: Option<u32>,

        /// Allow IPv6 during the bootstrap
        #[arg(long)]
        no_force_ipv4: bool,
    },

    /// Render the configuration files of a container into a directory
    Render {
        /// Container name
        name: String,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "MANAGEMENT")]
    management: String,
    #[tabled(rename = "TEST")]
    test: String,
    #[tabled(rename = "BRIDGE")]
    bridge: String,
    #[tabled(rename = "VLANS")]
    vlans: String,
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match &self.command {
            Commands::Check => self.check().await,
            Commands::List => self.list(),
            Commands::Create {
                name,
                mirror,
                attempts,
                no_force_ipv4,
            } => {
                let mut config = self.provision_config().with_force_ipv4(!no_force_ipv4);
                if let Some(mirror) = mirror {
                    config = config.with_mirror(mirror);
                }
                if let Some(attempts) = attempts {
                    config = config.with_max_attempts(*attempts);
                }
                self.create(name, config).await
            }
            Commands::Render { name, out } => self.render(name, out),
        }
    }

    fn executor(&self) -> Arc<dyn CommandExecutor> {
        if self.dry_run {
            Arc::new(DryRunExecutor)
        } else if self.no_sudo {
            Arc::new(SystemExecutor::without_sudo())
        } else {
            Arc::new(SystemExecutor::new())
        }
    }

    fn provision_config(&self) -> ProvisionConfig {
        let config = ProvisionConfig::default()
            .with_libvirt_uri(&self.uri)
            .with_dry_run(self.dry_run);
        match &self.root {
            Some(root) => config.with_root(root),
            None => config,
        }
    }

    fn load(&self) -> Result<SpecFile> {
        SpecFile::load(&self.config).map_err(report)
    }

    async fn check(&self) -> Result<()> {
        let checks = RequirementsChecker::new(self.executor(), &self.uri)
            .check()
            .await;
        for check in &checks.checks {
            let mark = if check.ok {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!("{mark} {:<12} {}", check.name, check.detail);
        }
        checks.ensure().map_err(report)?;
        println!("{}", style("All requirements satisfied").green().bold());
        Ok(())
    }

    fn list(&self) -> Result<()> {
        let file = self.load()?;
        let rows: Vec<ContainerRow> = file
            .container_names()
            .into_iter()
            .map(|key| match file.container_spec(key) {
                Ok(spec) => {
                    let test = spec.test_interface();
                    ContainerRow {
                        name: spec.name().to_string(),
                        management: spec.management_address().to_string(),
                        test: test
                            .address()
                            .map_or_else(|| "-".to_string(), |a| a.to_string()),
                        bridge: test.bridge().to_string(),
                        vlans: if spec.vlans().is_empty() {
                            "-".to_string()
                        } else {
                            spec.vlan_ids()
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join(",")
                        },
                    }
                }
                Err(e) => ContainerRow {
                    name: key.to_string(),
                    management: format!("invalid: {e}"),
                    test: String::new(),
                    bridge: String::new(),
                    vlans: String::new(),
                },
            })
            .collect();

        if rows.is_empty() {
            println!("No containers defined in {}", self.config.display());
        } else {
            println!("{}", Table::new(rows));
        }
        Ok(())
    }

    async fn create(&self, name: &str, config: ProvisionConfig) -> Result<()> {
        let spec = self.load()?.container_spec(name).map_err(report)?;
        let executor = self.executor();

        if self.dry_run {
            tracing::info!("Dry run, skipping requirements check");
        } else {
            RequirementsChecker::new(executor.clone(), &self.uri)
                .check()
                .await
                .ensure()
                .map_err(report)?;
        }

        let orchestrator = Orchestrator::new(config, executor);
        let summary = tokio::select! {
            result = orchestrator.create_container(&spec) => result.map_err(report)?,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!(container = name, "Interrupted, stopping in-flight command");
                return Err(report(LabError::Interrupted));
            }
        };

        println!("\n{summary}");
        Ok(())
    }

    fn render(&self, name: &str, out: &std::path::Path) -> Result<()> {
        let spec = self.load()?.container_spec(name).map_err(report)?;
        let written = write_local(&spec, out).map_err(report)?;
        for path in written {
            println!("{}", path.display());
        }
        Ok(())
    }
}

/// Render a lab error with its diagnostic code and help.
fn report(err: LabError) -> color_eyre::Report {
    eyre!("{:?}", miette::Report::new(err))
}
