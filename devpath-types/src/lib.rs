// SPDX-License-Identifier: GPL-3.0-only

//! UEFI device path node types
//!
//! This crate is the node library the translator populates. It defines the
//! handful of node types needed to name a file on local storage:
//!
//! - **Hardware path**: ACPI root, PCI function, NVMe namespace, SATA port
//! - **Media path**: hard drive partition, file path
//!
//! Nodes carry plain fields only. A [`DevicePath`] renders in the UEFI text
//! form (`PciRoot(0x0)/Pci(0x1d,0x0)/...`) through `Display`.

pub mod node;
pub mod partition;
pub mod path;

pub use node::*;
pub use partition::*;
pub use path::*;
