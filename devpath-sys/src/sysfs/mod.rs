// SPDX-License-Identifier: GPL-3.0-only

//! Hardware path discovery from the kernel device topology tree
//!
//! The sysfs entry of a block device is a chain of directories below
//! `/sys/devices` whose names encode the bus of each hop, for example
//! `pci0000:00/0000:00:1d.0/0000:3d:00.0/nvme/nvme0/nvme0n1`. The walker feeds
//! this chain, root end first, to an ordered registry of [`BusHandler`]s.
//! Each handler either claims the next components (emitting zero or one node)
//! or passes. A chain nobody can claim is an error.

mod handlers;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use devpath_types::{AcpiNode, DevicePathNode, NvmeNamespaceNode, PciNode, SataNode};
use tracing::debug;

use crate::error::{ErrorKind, Result};

pub use handlers::{
    AcpiHandler, AtaHandler, BlockHandler, BusHandler, GenericHandler, HandlerError,
    HandlerOutcome, HandlerRegistry, NvmeHandler, PciHandler, PciRootHandler, VirtualHandler,
};

/// One hop of the hardware path, root bridge first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyNode {
    Acpi(AcpiNode),
    Pci(PciNode),
    NvmeNamespace(NvmeNamespaceNode),
    Sata(SataNode),
}

impl From<TopologyNode> for DevicePathNode {
    fn from(node: TopologyNode) -> Self {
        match node {
            TopologyNode::Acpi(node) => Self::Acpi(node),
            TopologyNode::Pci(node) => Self::Pci(node),
            TopologyNode::NvmeNamespace(node) => Self::NvmeNamespace(node),
            TopologyNode::Sata(node) => Self::Sata(node),
        }
    }
}

/// Cursor over the component chain, handed to each handler in turn
#[derive(Debug)]
pub struct WalkState<'a> {
    devices_root: &'a Path,
    components: &'a [String],
    position: usize,
    nodes: Vec<TopologyNode>,
}

impl<'a> WalkState<'a> {
    fn new(devices_root: &'a Path, components: &'a [String]) -> Self {
        Self {
            devices_root,
            components,
            position: 0,
            nodes: Vec::new(),
        }
    }

    /// Components not yet claimed by a handler
    pub fn remaining(&self) -> &'a [String] {
        &self.components[self.position..]
    }

    /// The `n`th unclaimed component, 0 being the next one
    pub fn peek(&self, n: usize) -> Option<&'a str> {
        self.remaining().get(n).map(String::as_str)
    }

    /// Directory of the `n`th unclaimed component
    pub fn dir(&self, n: usize) -> PathBuf {
        let end = (self.position + n + 1).min(self.components.len());
        let mut dir = self.devices_root.to_path_buf();
        dir.extend(&self.components[..end]);
        dir
    }

    /// Read a sysfs attribute relative to the `n`th unclaimed component
    pub fn read_attr(&self, n: usize, attr: &str) -> io::Result<String> {
        fs::read_to_string(self.dir(n).join(attr)).map(|raw| raw.trim().to_string())
    }

    pub fn nodes(&self) -> &[TopologyNode] {
        &self.nodes
    }

    /// Claim the next `count` components.
    pub fn advance(&mut self, count: usize) {
        self.position = (self.position + count).min(self.components.len());
    }

    pub fn push(&mut self, node: TopologyNode) {
        debug!(?node, "topology node");
        self.nodes.push(node);
    }
}

/// Walk the topology of the whole-disk block device `disk_name`.
pub fn walk_topology(
    sysfs: &Path,
    disk_name: &str,
    registry: &HandlerRegistry,
) -> Result<Vec<TopologyNode>> {
    let class_entry = sysfs.join("class/block").join(disk_name);
    let device_path = fs::canonicalize(&class_entry).map_err(|e| {
        ErrorKind::io(
            format!("cannot find the topology entry for {}", class_entry.display()),
            e,
        )
    })?;
    let devices_root = fs::canonicalize(sysfs.join("devices")).map_err(|e| {
        ErrorKind::io(format!("cannot read {}/devices", sysfs.display()), e)
    })?;

    let components: Vec<String> = match device_path.strip_prefix(&devices_root) {
        Ok(relative) => relative
            .iter()
            .map(|c| c.to_string_lossy().into_owned())
            .collect(),
        Err(_) => {
            return Err(ErrorKind::UnsupportedDevice {
                handler: "root".to_string(),
                components: device_path.display().to_string(),
                path: device_path.clone(),
                reason: format!("device is not below {}", devices_root.display()),
            });
        }
    };

    debug!(path = %device_path.display(), "walking device topology");

    let mut state = WalkState::new(&devices_root, &components);
    while !state.remaining().is_empty() {
        let remaining = state.remaining().join("/");
        let before = state.position;
        let mut claimed = false;

        for handler in registry.iter() {
            match handler.handle(&mut state) {
                Ok(HandlerOutcome::Skip) => continue,
                Ok(HandlerOutcome::Handled) => {
                    if state.position == before {
                        return Err(ErrorKind::UnsupportedDevice {
                            handler: handler.name().to_string(),
                            components: remaining,
                            path: device_path,
                            reason: "handler claimed no components".to_string(),
                        });
                    }
                    claimed = true;
                    break;
                }
                Err(HandlerError::Unsupported(reason)) => {
                    return Err(ErrorKind::UnsupportedDevice {
                        handler: handler.name().to_string(),
                        components: remaining,
                        path: device_path,
                        reason,
                    });
                }
                Err(HandlerError::Io { context, source }) => {
                    return Err(ErrorKind::io(
                        format!("[handler {}] {context}", handler.name()),
                        source,
                    ));
                }
            }
        }

        if !claimed {
            return Err(ErrorKind::UnsupportedDevice {
                handler: "none".to_string(),
                components: remaining,
                path: device_path,
                reason: "unhandled device".to_string(),
            });
        }
    }

    Ok(state.nodes)
}
