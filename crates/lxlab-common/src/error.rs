//! Common error types for lxlab.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`LabError`].
pub type LabResult<T> = Result<T, LabError>;

/// Errors raised while validating or provisioning a container.
#[derive(Error, Diagnostic, Debug)]
pub enum LabError {
    /// The container specification is invalid.
    #[error("Invalid container specification: {message}")]
    #[diagnostic(code(lxlab::spec::invalid))]
    Validation {
        /// What is wrong with the specification.
        message: String,
    },

    /// An external command could not be started.
    #[error("Failed to execute {command}: {source}")]
    #[diagnostic(code(lxlab::exec::spawn))]
    Spawn {
        /// The command line that failed to start.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An external command exited unsuccessfully.
    #[error("Command `{command}` failed ({status}){}", format_stderr(.stderr))]
    #[diagnostic(code(lxlab::exec::failed))]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// Exit status description.
        status: String,
        /// Trailing standard error output.
        stderr: String,
    },

    /// Bridge VLAN configuration failed.
    #[error("{}", bridge_message(.bridge, .vlan))]
    #[diagnostic(
        code(lxlab::bridge),
        help("Check that the bridge exists (`ip link show type bridge`)")
    )]
    Bridge {
        /// Bridge name.
        bridge: String,
        /// VLAN id being added, if the failure was a VLAN add.
        vlan: Option<u16>,
        /// The tool failure.
        #[source]
        source: Box<LabError>,
    },

    /// Root filesystem bootstrap failed on every attempt.
    #[error("Failed to create rootfs after {attempts} attempts")]
    #[diagnostic(
        code(lxlab::rootfs::exhausted),
        help("The package mirror may be unreachable; try another with --mirror")
    )]
    RootfsExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The failure of the last attempt.
        #[source]
        last_error: Box<LabError>,
    },

    /// Package installation inside the rootfs failed.
    #[error("Failed to install packages in container {container}")]
    #[diagnostic(code(lxlab::packages))]
    PackageInstall {
        /// Container name.
        container: String,
        /// The tool failure.
        #[source]
        source: Box<LabError>,
    },

    /// A required binary or driver is not available.
    #[error("Missing dependency: {what}")]
    #[diagnostic(code(lxlab::missing_dependency))]
    MissingDependency {
        /// The missing component.
        what: String,
        /// Installation hint.
        #[help]
        hint: Option<String>,
    },

    /// Domain definition was rejected by libvirt.
    #[error("Failed to define domain {domain}")]
    #[diagnostic(code(lxlab::libvirt::define))]
    Registration {
        /// Domain name.
        domain: String,
        /// The tool failure.
        #[source]
        source: Box<LabError>,
    },

    /// A provisioning stage failed.
    #[error("Provisioning of {container} failed at stage {stage}")]
    #[diagnostic(code(lxlab::stage))]
    Stage {
        /// Stage that failed.
        stage: String,
        /// Container name.
        container: String,
        /// The stage failure.
        #[source]
        source: Box<LabError>,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(lxlab::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// The operation was interrupted by the operator.
    #[error("Interrupted")]
    #[diagnostic(code(lxlab::interrupted))]
    Interrupted,

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(lxlab::io))]
    Io(#[from] std::io::Error),
}

impl LabError {
    /// Shorthand for a [`LabError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`LabError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wrap this error with the stage and container it occurred in.
    #[must_use]
    pub fn in_stage(self, stage: impl ToString, container: &str) -> Self {
        Self::Stage {
            stage: stage.to_string(),
            container: container.to_string(),
            source: Box::new(self),
        }
    }
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

fn bridge_message(bridge: &str, vlan: &Option<u16>) -> String {
    match vlan {
        Some(id) => format!("Failed to add VLAN {id} to bridge {bridge}"),
        None => format!("Failed to configure VLAN filtering on bridge {bridge}"),
    }
}
