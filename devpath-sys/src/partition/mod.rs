// SPDX-License-Identifier: GPL-3.0-only

//! Partition lookup for the device backing a mount
//!
//! The mount's device node is split into its whole-disk device and partition
//! number. The disk's partition table is then read, GPT first, and the
//! matching entry is returned. A mount directly on a whole disk (such as a
//! loop device) has no partition, which is a valid outcome.

mod gpt;
mod mbr;
mod name;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use devpath_types::{HardDriveNode, HardDriveSignature, PartitionFormat};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::device::{BlockDevice, BlockDeviceOpener};
use crate::error::{ErrorKind, Result};
use crate::path::resolve_path;

pub use name::split_partition_name;

const DEFAULT_SECTOR_SIZE: u64 = 512;
const MAX_SECTOR_SIZE: u64 = 64 * 1024;

/// Why a partition table could not be used
#[derive(Debug)]
pub(crate) enum TableError {
    /// Missing or malformed on-disk structures.
    Malformed(String),
    /// The disk itself could not be read.
    Io { context: String, source: io::Error },
}

impl TableError {
    /// Classify a failed read. Running off the end of the disk or computing
    /// an impossible offset means the table points somewhere bogus; anything
    /// else is a device failure.
    pub(crate) fn read(context: impl Into<String>, source: io::Error) -> Self {
        let context = context.into();
        match source.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidInput => {
                Self::Malformed(format!("{context}: {source}"))
            }
            _ => Self::Io { context, source },
        }
    }

    fn into_error_kind(self, device: &Path) -> ErrorKind {
        match self {
            Self::Malformed(reason) => ErrorKind::partition_table(device, reason),
            Self::Io { context, source } => {
                ErrorKind::io(format!("{}: {context}", device.display()), source)
            }
        }
    }
}

impl From<String> for TableError {
    fn from(reason: String) -> Self {
        Self::Malformed(reason)
    }
}

/// Scheme-specific identity of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionScheme {
    Gpt { unique_guid: Uuid },
    Mbr { disk_signature: u32 },
}

/// Location of a partition on its disk, in logical blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Partition number (1-based)
    pub number: u32,
    pub start: u64,
    pub size: u64,
    pub scheme: PartitionScheme,
}

impl PartitionInfo {
    pub fn format(&self) -> PartitionFormat {
        match self.scheme {
            PartitionScheme::Gpt { .. } => PartitionFormat::Gpt,
            PartitionScheme::Mbr { .. } => PartitionFormat::Mbr,
        }
    }

    pub fn signature(&self) -> HardDriveSignature {
        match self.scheme {
            PartitionScheme::Gpt { unique_guid } => HardDriveSignature::Guid(unique_guid),
            PartitionScheme::Mbr { disk_signature } => HardDriveSignature::Mbr(disk_signature),
        }
    }

    pub fn to_node(&self) -> HardDriveNode {
        HardDriveNode {
            partition_number: self.number,
            partition_start: self.start,
            partition_size: self.size,
            signature: self.signature(),
            format: self.format(),
        }
    }
}

/// The whole disk behind a mount's device node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRef {
    /// Kernel name of the whole disk, e.g. `nvme0n1`
    pub disk_name: String,

    /// Device node of the whole disk, e.g. `/dev/nvme0n1`
    pub disk_node: PathBuf,

    /// Partition number when the device node is a partition
    pub partition: Option<u32>,
}

/// Work out which disk and partition a device node names.
///
/// Symlinked nodes such as `/dev/disk/by-partuuid/...` are followed under
/// `root`. The kernel's `partition` attribute is preferred; naming
/// conventions are the fallback when the topology tree has no entry for the
/// device.
pub fn identify_device(device: &str, root: &Path, sysfs: &Path) -> DiskRef {
    let node = resolve_device_node(root, device);
    let name = node
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dev_dir = node.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/dev"));

    if let Some((disk_name, number)) = partition_from_sysfs(sysfs, &name) {
        debug!(device, disk = %disk_name, number, "partition identified from sysfs");
        return DiskRef {
            disk_node: dev_dir.join(&disk_name),
            disk_name,
            partition: Some(number),
        };
    }

    match split_partition_name(&name) {
        Some((disk_name, number)) => DiskRef {
            disk_node: dev_dir.join(&disk_name),
            disk_name,
            partition: Some(number),
        },
        None => DiskRef {
            disk_name: name,
            disk_node: node,
            partition: None,
        },
    }
}

/// Follow symlinks in an absolute device node path. Sources that are not
/// paths (`tmpfs`, `UUID=...`) or do not exist under `root` are kept as named.
fn resolve_device_node(root: &Path, device: &str) -> PathBuf {
    let named = Path::new(device);
    if !named.is_absolute() {
        return named.to_path_buf();
    }
    match resolve_path(root, named) {
        Ok(resolved) => resolved.into_path_buf(),
        Err(err) => {
            debug!(device, root = %root.display(), error = %err, "device node not resolvable, using it as named");
            named.to_path_buf()
        }
    }
}

fn partition_from_sysfs(sysfs: &Path, name: &str) -> Option<(String, u32)> {
    if name.is_empty() {
        return None;
    }

    let class_entry = sysfs.join("class/block").join(name);
    let number = fs::read_to_string(class_entry.join("partition"))
        .ok()?
        .trim()
        .parse::<u32>()
        .ok()?;
    let real = fs::canonicalize(&class_entry).ok()?;
    let disk_name = real.parent()?.file_name()?.to_string_lossy().into_owned();
    Some((disk_name, number))
}

/// Logical sector size: device ioctl, then sysfs, then 512.
fn sector_size(device: &dyn BlockDevice, sysfs: &Path, disk_name: &str) -> u64 {
    if let Some(size) = device.logical_block_size() {
        if (DEFAULT_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&size) && size.is_power_of_two() {
            return size;
        }
        warn!("suspicious logical block size from ioctl: {size}; disk={disk_name}");
    }

    let attr = sysfs
        .join("class/block")
        .join(disk_name)
        .join("queue/logical_block_size");
    match fs::read_to_string(&attr).map(|raw| raw.trim().parse::<u64>()) {
        Ok(Ok(size))
            if (DEFAULT_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&size) && size.is_power_of_two() =>
        {
            size
        }
        Ok(_) => {
            warn!("suspicious logical_block_size in {}", attr.display());
            DEFAULT_SECTOR_SIZE
        }
        Err(_) => DEFAULT_SECTOR_SIZE,
    }
}

/// Read the partition table of `disk` and find its partition.
///
/// Returns `Ok(None)` when the device node is not a partition.
pub fn locate_partition(
    disk: &DiskRef,
    opener: &dyn BlockDeviceOpener,
    sysfs: &Path,
) -> Result<Option<PartitionInfo>> {
    let Some(number) = disk.partition else {
        debug!(disk = %disk.disk_name, "device is not a partition");
        return Ok(None);
    };

    let mut device = opener.open(&disk.disk_node).map_err(|e| {
        ErrorKind::io(format!("cannot open {}", disk.disk_node.display()), e)
    })?;
    let sector_size = sector_size(device.as_ref(), sysfs, &disk.disk_name);

    let info = match gpt::find_partition(device.as_mut(), sector_size, number) {
        gpt::GptLookup::Found(info) => info,
        gpt::GptLookup::Failed(err) => return Err(err.into_error_kind(&disk.disk_node)),
        gpt::GptLookup::Absent => {
            debug!(disk = %disk.disk_name, "no GPT signature, reading MBR");
            mbr::find_partition(device.as_mut(), sector_size, number)
                .map_err(|err| err.into_error_kind(&disk.disk_node))?
        }
    };

    debug!(
        disk = %disk.disk_name,
        number = info.number,
        start = info.start,
        size = info.size,
        format = %info.format(),
        "located partition"
    );
    Ok(Some(info))
}
