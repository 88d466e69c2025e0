// SPDX-License-Identifier: GPL-3.0-only

//! Mount table parsing and longest-prefix mount selection

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ErrorKind, Result};
use crate::path::ResolvedPath;

/// One record of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mount source, normally a device node such as `/dev/nvme0n1p1`
    pub device: String,
    pub mount_point: PathBuf,
    pub fs_type: String,

    /// Directory of the filesystem exposed at the mount point.
    ///
    /// `/` except for bind mounts of a subdirectory, and only known when the
    /// table is in mountinfo format.
    pub root: PathBuf,
}

/// The mount a resolved path lives on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountMatch {
    pub entry: MountEntry,

    /// Remainder of the resolved path below the mount point
    pub relative: PathBuf,
}

impl MountMatch {
    /// Path of the file inside its filesystem, in UEFI `\` notation.
    pub fn efi_path(&self) -> String {
        let full = self.entry.root.join(&self.relative);
        let mut output = String::new();
        for component in full.components() {
            if let Component::Normal(name) = component {
                output.push('\\');
                output.push_str(&name.to_string_lossy());
            }
        }

        if output.is_empty() {
            output.push('\\');
        }
        output
    }
}

pub fn read_mount_table(path: &Path) -> Result<Vec<MountEntry>> {
    let raw = fs::read_to_string(path).map_err(|e| {
        ErrorKind::io(format!("cannot read mount table {}", path.display()), e)
    })?;
    Ok(parse_mount_table(&raw))
}

/// Parse a mount table in either `/proc/mounts` or mountinfo format.
///
/// The format is detected per line: mountinfo records carry a ` - `
/// separator before the filesystem type. Malformed lines are skipped.
pub fn parse_mount_table(input: &str) -> Vec<MountEntry> {
    let mut entries = Vec::new();

    for line in input.lines().filter(|line| !line.trim().is_empty()) {
        let parsed = if line.contains(" - ") {
            parse_mountinfo_line(line)
        } else {
            parse_mounts_line(line)
        };

        match parsed {
            Some(entry) => entries.push(entry),
            None => warn!("skipping malformed mount table line: {line}"),
        }
    }

    entries
}

fn parse_mountinfo_line(line: &str) -> Option<MountEntry> {
    let (left, right) = line.split_once(" - ")?;

    let mut left_fields = left.split_whitespace();
    let root = left_fields.nth(3)?;
    let mount_point = left_fields.next()?;

    let mut right_fields = right.split_whitespace();
    let fs_type = right_fields.next()?;
    let device = right_fields.next()?;

    Some(MountEntry {
        device: unescape_mount_field(device),
        mount_point: PathBuf::from(unescape_mount_field(mount_point)),
        fs_type: unescape_mount_field(fs_type),
        root: PathBuf::from(unescape_mount_field(root)),
    })
}

fn parse_mounts_line(line: &str) -> Option<MountEntry> {
    let mut fields = line.split_whitespace();
    let device = fields.next()?;
    let mount_point = fields.next()?;
    let fs_type = fields.next()?;

    Some(MountEntry {
        device: unescape_mount_field(device),
        mount_point: PathBuf::from(unescape_mount_field(mount_point)),
        fs_type: unescape_mount_field(fs_type),
        root: PathBuf::from("/"),
    })
}

fn unescape_mount_field(value: &str) -> String {
    let mut output = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 3 < bytes.len()
            && bytes[index + 1..index + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let octal = &value[index + 1..index + 4];
            if let Ok(num) = u8::from_str_radix(octal, 8) {
                output.push(num);
                index += 4;
                continue;
            }
        }

        output.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&output).into_owned()
}

/// Pick the mount whose mount point is the longest ancestor of `path`.
///
/// Ancestry is decided on whole path components. When several entries share
/// the winning mount point, the last one listed wins, as it is the mount
/// stacked on top.
pub fn select_mount(entries: &[MountEntry], path: &ResolvedPath) -> Result<MountMatch> {
    let path = path.as_path();
    let mut best: Option<(&MountEntry, usize)> = None;

    for entry in entries {
        if !path.starts_with(&entry.mount_point) {
            continue;
        }

        let depth = entry.mount_point.components().count();
        if best.is_none_or(|(_, best_depth)| depth >= best_depth) {
            best = Some((entry, depth));
        }
    }

    let (entry, _) = best.ok_or_else(|| ErrorKind::MountNotFound {
        path: path.to_path_buf(),
    })?;

    let relative = path
        .strip_prefix(&entry.mount_point)
        .map(Path::to_path_buf)
        .unwrap_or_default();

    debug!(
        device = %entry.device,
        mount_point = %entry.mount_point.display(),
        root = %entry.root.display(),
        relative = %relative.display(),
        "selected mount"
    );

    Ok(MountMatch {
        entry: entry.clone(),
        relative,
    })
}
