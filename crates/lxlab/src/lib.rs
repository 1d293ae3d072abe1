//! # lxlab
//!
//! Provisioning pipeline for LXC network-test containers.
//!
//! A [`ContainerSpec`] describes one container: a management interface, a
//! test interface attached to a host bridge either directly or through
//! VLANs, a default gateway and resource sizing. The [`Orchestrator`] takes
//! a spec through every stage:
//!
//! 1. configure VLAN filtering and membership on the test bridge
//! 2. create the container directories
//! 3. bootstrap an Ubuntu rootfs with `debootstrap`, retrying on failure
//! 4. install the network test tooling and FRR inside the rootfs
//! 5. render the FRR configuration, the `network-test` helper and the
//!    container init script
//! 6. render the libvirt domain XML
//! 7. (re)define the domain on the `lxc:///` connection

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod libvirt;
pub mod loader;
pub mod orchestrator;
pub mod packages;
pub mod render;
pub mod requirements;
pub mod rootfs;
pub mod spec;
pub mod summary;

pub use config::{BootstrapOptions, ProvisionConfig};
pub use loader::SpecFile;
pub use orchestrator::{Orchestrator, ProvisionStage};
pub use render::{Artifact, RenderedFile};
pub use spec::{ContainerSpec, InterfaceAddress, NetworkInterface, VlanConfig};
pub use summary::ProvisionSummary;
