// SPDX-License-Identifier: GPL-3.0-only

//! Partitioning scheme tags carried by hard drive nodes

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Partition table type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionFormat {
    /// MBR/DOS (Master Boot Record)
    Mbr,

    /// GPT (GUID Partition Table)
    Gpt,
}

impl PartitionFormat {
    /// Name used in the UEFI text representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mbr => "MBR",
            Self::Gpt => "GPT",
        }
    }
}

impl fmt::Display for PartitionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature identifying a partition's disk (MBR) or the partition itself (GPT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum HardDriveSignature {
    /// 32-bit MBR disk signature (offset 440 of LBA 0)
    Mbr(u32),

    /// Unique partition GUID from the GPT entry
    Guid(Uuid),
}

impl fmt::Display for HardDriveSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mbr(sig) => write!(f, "{sig:#010x}"),
            Self::Guid(guid) => {
                let mut buf = Uuid::encode_buffer();
                f.write_str(guid.hyphenated().encode_upper(&mut buf))
            }
        }
    }
}
