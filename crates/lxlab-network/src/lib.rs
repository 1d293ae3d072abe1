//! # lxlab-network
//!
//! Networking primitives for lxlab containers.
//!
//! This crate drives the host side of container networking: VLAN-aware
//! filtering on Linux bridges and bridge VLAN membership.

#![warn(missing_docs)]

pub mod bridge;

pub use bridge::BridgeVlanManager;
