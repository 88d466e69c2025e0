// SPDX-License-Identifier: GPL-3.0-only

//! Kernel block device naming conventions

/// Disk name prefixes whose partitions are named `<disk><letters><N>`.
const LETTER_DISK_PREFIXES: &[&str] = &["sd", "hd", "vd", "xvd"];

/// Split a partition device name into its disk name and partition number.
///
/// Returns `None` for whole-disk names such as `sda`, `nvme0n1` or `loop1`.
pub fn split_partition_name(name: &str) -> Option<(String, u32)> {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if stem.len() == name.len() || stem.is_empty() {
        return None;
    }

    let number: u32 = name[stem.len()..].parse().ok()?;
    if number == 0 {
        return None;
    }

    // nvme0n1p1, mmcblk0p2, loop0p1: disks ending in a digit use a 'p' infix.
    if let Some(disk) = stem.strip_suffix('p') {
        if disk.ends_with(|c: char| c.is_ascii_digit()) {
            return Some((disk.to_string(), number));
        }
    }

    let is_letter_disk = LETTER_DISK_PREFIXES.iter().any(|prefix| {
        stem.strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_lowercase()))
    });
    if is_letter_disk {
        return Some((stem.to_string(), number));
    }

    None
}
