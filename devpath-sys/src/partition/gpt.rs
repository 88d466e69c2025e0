// SPDX-License-Identifier: GPL-3.0-only

//! GUID Partition Table parsing

use tracing::{debug, warn};

use super::{PartitionInfo, PartitionScheme, TableError};
use crate::device::{BlockDevice, device_size, read_sectors};

const SIGNATURE: &[u8; 8] = b"EFI PART";
const REVISION_1_0: u32 = 0x0001_0000;
const MIN_HEADER_SIZE: u32 = 92;
const MIN_ENTRY_SIZE: u32 = 128;
/// Upper bound on the entry array we are willing to read.
const MAX_ENTRY_ARRAY_BYTES: u64 = 4 * 1024 * 1024;

/// Fields of a GPT header needed to find partition entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GptHeader {
    pub my_lba: u64,
    pub alternate_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub entries_lba: u64,
    pub num_entries: u32,
    pub entry_size: u32,
    pub entries_crc: u32,
}

/// Why a sector could not be used as a GPT header
#[derive(Debug)]
pub(crate) enum HeaderError {
    /// No `EFI PART` signature: this is not a GPT disk.
    Absent,
    /// Signature present but the header is damaged.
    Invalid(String),
    /// The sector could not be read at all.
    Unreadable(TableError),
}

/// Outcome of looking for a partition in a GPT
#[derive(Debug)]
pub(crate) enum GptLookup {
    /// The disk has no GPT.
    Absent,
    Found(PartitionInfo),
    Failed(TableError),
}

impl GptLookup {
    fn malformed(reason: String) -> Self {
        Self::Failed(TableError::Malformed(reason))
    }
}

fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn le_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

pub(crate) fn parse_header(sector: &[u8]) -> Result<GptHeader, HeaderError> {
    if sector.len() < MIN_HEADER_SIZE as usize || &sector[0..8] != SIGNATURE {
        return Err(HeaderError::Absent);
    }

    let revision = le_u32(sector, 8);
    if revision != REVISION_1_0 {
        return Err(HeaderError::Invalid(format!(
            "unsupported header revision {revision:#010x}"
        )));
    }

    let header_size = le_u32(sector, 12);
    if header_size < MIN_HEADER_SIZE || header_size as usize > sector.len() {
        return Err(HeaderError::Invalid(format!(
            "bad header size {header_size}"
        )));
    }

    let stored_crc = le_u32(sector, 16);
    let mut header = sector[..header_size as usize].to_vec();
    header[16..20].fill(0);
    let computed_crc = crc32fast::hash(&header);
    if stored_crc != computed_crc {
        return Err(HeaderError::Invalid(format!(
            "header checksum mismatch (stored {stored_crc:#010x}, computed {computed_crc:#010x})"
        )));
    }

    let parsed = GptHeader {
        my_lba: le_u64(sector, 24),
        alternate_lba: le_u64(sector, 32),
        first_usable_lba: le_u64(sector, 40),
        last_usable_lba: le_u64(sector, 48),
        entries_lba: le_u64(sector, 72),
        num_entries: le_u32(sector, 80),
        entry_size: le_u32(sector, 84),
        entries_crc: le_u32(sector, 88),
    };

    if parsed.entry_size < MIN_ENTRY_SIZE || parsed.entry_size % MIN_ENTRY_SIZE != 0 {
        return Err(HeaderError::Invalid(format!(
            "bad partition entry size {}",
            parsed.entry_size
        )));
    }
    if parsed.num_entries == 0 {
        return Err(HeaderError::Invalid("empty partition entry array".to_string()));
    }
    if parsed.first_usable_lba > parsed.last_usable_lba {
        return Err(HeaderError::Invalid(format!(
            "first usable LBA {} is past last usable LBA {}",
            parsed.first_usable_lba, parsed.last_usable_lba
        )));
    }

    Ok(parsed)
}

fn read_header(
    device: &mut dyn BlockDevice,
    sector_size: u64,
    lba: u64,
) -> Result<GptHeader, HeaderError> {
    let sector = read_sectors(device, sector_size, lba, 1).map_err(|e| {
        match TableError::read(format!("cannot read LBA {lba}"), e) {
            TableError::Malformed(reason) => HeaderError::Invalid(reason),
            err => HeaderError::Unreadable(err),
        }
    })?;
    parse_header(&sector)
}

/// Locate the valid header: the primary at LBA 1, or the backup when the
/// primary carries a signature but fails validation.
fn locate_header(
    device: &mut dyn BlockDevice,
    sector_size: u64,
) -> Result<Option<GptHeader>, TableError> {
    let primary_error = match read_header(device, sector_size, 1) {
        Ok(header) => return Ok(Some(header)),
        Err(HeaderError::Absent) => return Ok(None),
        Err(HeaderError::Invalid(reason)) => reason,
        Err(HeaderError::Unreadable(err)) => return Err(err),
    };

    warn!("primary GPT header is invalid ({primary_error}), trying the backup header");

    let size = device_size(device).map_err(|e| TableError::read("cannot determine disk size", e))?;
    let last_lba = (size / sector_size).saturating_sub(1);
    if last_lba <= 1 {
        return Err(format!("primary header: {primary_error}").into());
    }

    match read_header(device, sector_size, last_lba) {
        Ok(header) if header.my_lba == last_lba => Ok(Some(header)),
        Ok(_) => Err(format!(
            "primary header: {primary_error}; backup header at LBA {last_lba} does not describe itself"
        )
        .into()),
        Err(HeaderError::Absent) => {
            Err(format!("primary header: {primary_error}; no backup header").into())
        }
        Err(HeaderError::Invalid(backup_error)) => Err(format!(
            "primary header: {primary_error}; backup header: {backup_error}"
        )
        .into()),
        Err(HeaderError::Unreadable(err)) => Err(err),
    }
}

/// Find partition `number` (1-based) in the disk's GPT.
pub(crate) fn find_partition(
    device: &mut dyn BlockDevice,
    sector_size: u64,
    number: u32,
) -> GptLookup {
    let header = match locate_header(device, sector_size) {
        Ok(Some(header)) => header,
        Ok(None) => return GptLookup::Absent,
        Err(err) => return GptLookup::Failed(err),
    };

    debug!(
        my_lba = header.my_lba,
        alternate_lba = header.alternate_lba,
        entries_lba = header.entries_lba,
        num_entries = header.num_entries,
        entry_size = header.entry_size,
        "found GPT header"
    );

    let array_bytes = u64::from(header.num_entries) * u64::from(header.entry_size);
    if array_bytes > MAX_ENTRY_ARRAY_BYTES {
        return GptLookup::malformed(format!(
            "partition entry array of {array_bytes} bytes is too large"
        ));
    }

    let sectors = array_bytes.div_ceil(sector_size);
    let array = match read_sectors(device, sector_size, header.entries_lba, sectors) {
        Ok(array) => array,
        Err(e) => {
            return GptLookup::Failed(TableError::read(
                format!("cannot read partition entries at LBA {}", header.entries_lba),
                e,
            ));
        }
    };
    let array = &array[..array_bytes as usize];

    let computed_crc = crc32fast::hash(array);
    if computed_crc != header.entries_crc {
        return GptLookup::malformed(format!(
            "partition entry array checksum mismatch (stored {:#010x}, computed {computed_crc:#010x})",
            header.entries_crc
        ));
    }

    if number == 0 || number > header.num_entries {
        return GptLookup::malformed(format!(
            "partition {number} is outside the {} entry table",
            header.num_entries
        ));
    }

    let entry_size = header.entry_size as usize;
    let offset = (number as usize - 1) * entry_size;
    let entry = &array[offset..offset + entry_size];

    if entry[0..16].iter().all(|b| *b == 0) {
        return GptLookup::malformed(format!("partition {number} is not in use"));
    }

    let mut unique_guid = [0u8; 16];
    unique_guid.copy_from_slice(&entry[16..32]);
    let first_lba = le_u64(entry, 32);
    let last_lba = le_u64(entry, 40);
    if last_lba < first_lba {
        return GptLookup::malformed(format!(
            "partition {number} ends at LBA {last_lba} before it starts at LBA {first_lba}"
        ));
    }

    GptLookup::Found(PartitionInfo {
        number,
        start: first_lba,
        size: last_lba - first_lba + 1,
        scheme: PartitionScheme::Gpt {
            unique_guid: uuid::Uuid::from_bytes_le(unique_guid),
        },
    })
}
