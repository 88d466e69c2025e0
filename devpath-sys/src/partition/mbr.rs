// SPDX-License-Identifier: GPL-3.0-only

//! Legacy MBR partition table parsing, including logical partitions

use tracing::debug;

use super::{PartitionInfo, PartitionScheme, TableError};
use crate::device::{BlockDevice, read_sectors};

const TABLE_OFFSET: usize = 446;
const ENTRY_SIZE: usize = 16;
const DISK_SIGNATURE_OFFSET: usize = 440;
const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xaa];

const TYPE_EMPTY: u8 = 0x00;
const TYPE_GPT_PROTECTIVE: u8 = 0xee;
const EXTENDED_TYPES: &[u8] = &[0x05, 0x0f, 0x85];

/// Bound on the logical partition chain, guarding against EBR loops.
const MAX_LOGICAL_PARTITIONS: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MbrEntry {
    kind: u8,
    start_lba: u32,
    sectors: u32,
}

impl MbrEntry {
    fn is_extended(&self) -> bool {
        EXTENDED_TYPES.contains(&self.kind)
    }
}

fn parse_table(sector: &[u8]) -> Result<[MbrEntry; 4], String> {
    if sector.len() < 512 || sector[510..512] != BOOT_SIGNATURE {
        return Err("missing boot signature".to_string());
    }

    let mut entries = [MbrEntry {
        kind: TYPE_EMPTY,
        start_lba: 0,
        sectors: 0,
    }; 4];

    for (index, entry) in entries.iter_mut().enumerate() {
        let raw = &sector[TABLE_OFFSET + index * ENTRY_SIZE..TABLE_OFFSET + (index + 1) * ENTRY_SIZE];
        *entry = MbrEntry {
            kind: raw[4],
            start_lba: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
            sectors: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
        };
    }

    Ok(entries)
}

/// Find partition `number` (1-based) in the disk's MBR.
///
/// Numbers 1 to 4 are primary slots, 5 and above walk the EBR chain of the
/// extended partition.
pub(crate) fn find_partition(
    device: &mut dyn BlockDevice,
    sector_size: u64,
    number: u32,
) -> Result<PartitionInfo, TableError> {
    let sector =
        read_sectors(device, sector_size, 0, 1).map_err(|e| TableError::read("cannot read LBA 0", e))?;
    let table = parse_table(&sector).map_err(|reason| format!("no valid partition table: {reason}"))?;
    let disk_signature = u32::from_le_bytes([
        sector[DISK_SIGNATURE_OFFSET],
        sector[DISK_SIGNATURE_OFFSET + 1],
        sector[DISK_SIGNATURE_OFFSET + 2],
        sector[DISK_SIGNATURE_OFFSET + 3],
    ]);

    if table.iter().any(|entry| entry.kind == TYPE_GPT_PROTECTIVE) {
        return Err("protective MBR found but the disk has no valid GPT".to_string().into());
    }

    let entry = match number {
        0 => return Err("partition numbers start at 1".to_string().into()),
        1..=4 => {
            let entry = table[number as usize - 1];
            if entry.kind == TYPE_EMPTY {
                return Err(format!("partition {number} is not in use").into());
            }
            entry
        }
        _ => find_logical(device, sector_size, &table, number)?,
    };

    debug!(number, kind = entry.kind, start = entry.start_lba, "found MBR partition");

    Ok(PartitionInfo {
        number,
        start: u64::from(entry.start_lba),
        size: u64::from(entry.sectors),
        scheme: PartitionScheme::Mbr { disk_signature },
    })
}

/// Walk the EBR chain and return the logical partition with `number`,
/// with its start made absolute.
fn find_logical(
    device: &mut dyn BlockDevice,
    sector_size: u64,
    table: &[MbrEntry; 4],
    number: u32,
) -> Result<MbrEntry, TableError> {
    let extended = table
        .iter()
        .find(|entry| entry.is_extended())
        .ok_or_else(|| format!("partition {number} requested but there is no extended partition"))?;

    let extended_start = u64::from(extended.start_lba);
    let mut ebr_lba = extended_start;
    let mut current = 5u32;

    while current - 5 < MAX_LOGICAL_PARTITIONS {
        let sector = read_sectors(device, sector_size, ebr_lba, 1)
            .map_err(|e| TableError::read(format!("cannot read extended boot record at LBA {ebr_lba}"), e))?;
        let ebr = parse_table(&sector)
            .map_err(|reason| format!("invalid extended boot record at LBA {ebr_lba}: {reason}"))?;

        if current == number {
            let logical = ebr[0];
            if logical.kind == TYPE_EMPTY {
                return Err(format!("partition {number} is not in use").into());
            }
            let start = ebr_lba + u64::from(logical.start_lba);
            let start_lba = u32::try_from(start)
                .map_err(|_| format!("partition {number} starts beyond the MBR addressable range"))?;
            return Ok(MbrEntry { start_lba, ..logical });
        }

        let next = ebr[1];
        if !next.is_extended() || next.start_lba == 0 {
            break;
        }
        ebr_lba = extended_start + u64::from(next.start_lba);
        current += 1;
    }

    Err(format!("partition {number} not found in the extended partition").into())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn put_entry(sector: &mut [u8], slot: usize, kind: u8, start: u32, sectors: u32) {
        let at = TABLE_OFFSET + slot * ENTRY_SIZE;
        sector[at + 4] = kind;
        sector[at + 8..at + 12].copy_from_slice(&start.to_le_bytes());
        sector[at + 12..at + 16].copy_from_slice(&sectors.to_le_bytes());
    }

    fn sign(sector: &mut [u8]) {
        sector[510] = 0x55;
        sector[511] = 0xaa;
    }

    /// Two primaries, an extended partition at LBA 100 holding two logicals.
    fn disk() -> Vec<u8> {
        let mut disk = vec![0u8; 512 * 200];
        disk[440..444].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        put_entry(&mut disk, 0, 0x0c, 2, 40);
        put_entry(&mut disk, 1, 0x83, 42, 50);
        put_entry(&mut disk, 2, 0x05, 100, 100);
        sign(&mut disk[..512]);

        let ebr1 = &mut disk[100 * 512..101 * 512];
        put_entry(ebr1, 0, 0x83, 1, 20);
        put_entry(ebr1, 1, 0x05, 30, 40);
        sign(ebr1);

        let ebr2 = &mut disk[130 * 512..131 * 512];
        put_entry(ebr2, 0, 0x83, 1, 30);
        sign(ebr2);

        disk
    }

    fn lookup(bytes: Vec<u8>, number: u32) -> Result<PartitionInfo, TableError> {
        let mut device: Box<dyn BlockDevice> = Box::new(Cursor::new(bytes));
        find_partition(device.as_mut(), 512, number)
    }

    fn malformed(result: Result<PartitionInfo, TableError>) -> String {
        match result {
            Err(TableError::Malformed(reason)) => reason,
            other => panic!("expected a malformed table, got {other:?}"),
        }
    }

    #[test]
    fn finds_primary_partition() {
        let info = lookup(disk(), 2).unwrap();
        assert_eq!((info.number, info.start, info.size), (2, 42, 50));
        assert_eq!(
            info.scheme,
            PartitionScheme::Mbr {
                disk_signature: 0x1234_5678
            }
        );
    }

    #[test]
    fn walks_logical_partitions() {
        let first = lookup(disk(), 5).unwrap();
        assert_eq!((first.start, first.size), (101, 20));

        let second = lookup(disk(), 6).unwrap();
        assert_eq!((second.start, second.size), (131, 30));

        assert!(lookup(disk(), 7).is_err());
    }

    #[test]
    fn empty_slot_is_an_error() {
        assert!(lookup(disk(), 4).is_err());
    }

    #[test]
    fn missing_boot_signature_is_an_error() {
        let reason = malformed(lookup(vec![0u8; 1024], 1));
        assert!(reason.contains("no valid partition table"));
    }

    #[test]
    fn protective_mbr_without_gpt_is_an_error() {
        let mut bytes = vec![0u8; 1024];
        put_entry(&mut bytes, 0, TYPE_GPT_PROTECTIVE, 1, 1);
        sign(&mut bytes[..512]);
        assert!(malformed(lookup(bytes, 1)).contains("protective"));
    }

    #[test]
    fn extended_partition_past_the_end_is_malformed() {
        let mut bytes = disk();
        bytes.truncate(512 * 100);
        let reason = malformed(lookup(bytes, 5));
        assert!(reason.contains("extended boot record at LBA 100"), "{reason}");
    }
}
