// SPDX-License-Identifier: GPL-3.0-only

//! Assembly of the final device path for each output mode

use std::fmt;

use devpath_types::{DevicePath, DevicePathNode, FilePathNode};

use crate::error::{ErrorKind, Result};
use crate::partition::PartitionInfo;
use crate::sysfs::TopologyNode;

/// Which form of device path to produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Only the file path inside the filesystem.
    ShortFormPathFile,
    /// The partition and the file path, firmware searches for the disk.
    ShortFormPathHD,
    /// The complete hardware path down to the file.
    #[default]
    FullPath,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShortFormPathFile => "short-form-file",
            Self::ShortFormPathHD => "short-form-hd",
            Self::FullPath => "full",
        }
    }

    pub fn needs_partition(self) -> bool {
        !matches!(self, Self::ShortFormPathFile)
    }

    pub fn needs_topology(self) -> bool {
        matches!(self, Self::FullPath)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the device path for `mode` from the pipeline stage outputs.
///
/// `topology` is ignored unless `mode` is [`Mode::FullPath`], and
/// `partition` is ignored for [`Mode::ShortFormPathFile`].
pub fn compose(
    mode: Mode,
    topology: &[TopologyNode],
    partition: Option<&PartitionInfo>,
    file: FilePathNode,
) -> Result<DevicePath> {
    let mut nodes: Vec<DevicePathNode> = Vec::new();

    match mode {
        Mode::ShortFormPathFile => {}
        Mode::ShortFormPathHD => {
            let partition = partition.ok_or(ErrorKind::UnpartitionedMedia)?;
            nodes.push(partition.to_node().into());
        }
        Mode::FullPath => {
            nodes.extend(topology.iter().copied().map(DevicePathNode::from));
            if let Some(partition) = partition {
                nodes.push(partition.to_node().into());
            }
        }
    }

    nodes.push(file.into());
    Ok(DevicePath::new(nodes))
}
