//! libvirt integration.

mod registrar;
mod xml;

pub use registrar::DomainRegistrar;
pub use xml::{DomainXmlGenerator, EMULATOR_CANDIDATES, xml_escape};
