// SPDX-License-Identifier: GPL-3.0-only

//! Device path node types
//!
//! Each node mirrors one UEFI device path node. Only the fields the
//! translator can populate from a running system are modelled.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::partition::{HardDriveSignature, PartitionFormat};

/// Compressed EISA ID of the PCI host bridge (`PNP0A03`)
pub const PCI_ROOT_HID: u32 = eisa_id(*b"PNP", 0x0a03);

/// Compressed EISA ID of the PCI Express host bridge (`PNP0A08`)
pub const PCIE_ROOT_HID: u32 = eisa_id(*b"PNP", 0x0a08);

/// Port multiplier port number used when no port multiplier is attached
pub const SATA_NO_PORT_MULTIPLIER: u16 = 0xffff;

/// Compress a three letter vendor prefix and product number into an EISA ID.
pub const fn eisa_id(vendor: [u8; 3], product: u16) -> u32 {
    let v0 = (vendor[0].wrapping_sub(b'@') & 0x1f) as u32;
    let v1 = (vendor[1].wrapping_sub(b'@') & 0x1f) as u32;
    let v2 = (vendor[2].wrapping_sub(b'@') & 0x1f) as u32;
    ((product as u32) << 16) | (v0 << 10) | (v1 << 5) | v2
}

/// Parse a textual EISA ID such as `PNP0A03`.
///
/// Returns `None` unless the input is three uppercase letters followed by
/// four hex digits.
pub fn parse_eisa_id(s: &str) -> Option<u32> {
    let bytes = s.as_bytes();
    if bytes.len() != 7 || !bytes[..3].iter().all(u8::is_ascii_uppercase) {
        return None;
    }
    if !bytes[3..].iter().all(u8::is_ascii_hexdigit) {
        return None;
    }

    let product = u16::from_str_radix(&s[3..], 16).ok()?;
    Some(eisa_id([bytes[0], bytes[1], bytes[2]], product))
}

fn format_eisa_id(hid: u32) -> String {
    let letter = |shift: u32| char::from(b'@' + ((hid >> shift) & 0x1f) as u8);
    format!("{}{}{}{:04X}", letter(10), letter(5), letter(0), hid >> 16)
}

/// ACPI device node, used for the root bridge of a hardware path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcpiNode {
    /// Compressed EISA hardware ID
    pub hid: u32,

    /// Unique ID distinguishing devices with the same HID
    pub uid: u32,
}

impl fmt::Display for AcpiNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hid {
            PCI_ROOT_HID => write!(f, "PciRoot({:#x})", self.uid),
            PCIE_ROOT_HID => write!(f, "PcieRoot({:#x})", self.uid),
            hid => write!(f, "Acpi({},{:#x})", format_eisa_id(hid), self.uid),
        }
    }
}

/// PCI function behind the previous bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PciNode {
    pub device: u8,
    pub function: u8,
}

impl fmt::Display for PciNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pci({:#x},{:#x})", self.device, self.function)
    }
}

/// NVMe namespace on the controller named by the previous PCI node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NvmeNamespaceNode {
    pub namespace_id: u32,

    /// IEEE EUI-64, all zeroes when the namespace does not report one
    pub eui64: [u8; 8],
}

impl fmt::Display for NvmeNamespaceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let eui = self
            .eui64
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join("-");
        write!(f, "NVMe({:#x},{eui})", self.namespace_id)
    }
}

/// SATA device on an AHCI host bus adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SataNode {
    /// Zero-based HBA port number
    pub hba_port: u16,

    /// Port multiplier port, or [`SATA_NO_PORT_MULTIPLIER`]
    pub port_multiplier_port: u16,

    pub lun: u16,
}

impl fmt::Display for SataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sata({:#x},{:#x},{:#x})",
            self.hba_port, self.port_multiplier_port, self.lun
        )
    }
}

/// Partition on a hard drive
///
/// Start and size are in logical blocks of the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardDriveNode {
    /// Partition number (1-based)
    pub partition_number: u32,
    pub partition_start: u64,
    pub partition_size: u64,
    pub signature: HardDriveSignature,
    pub format: PartitionFormat,
}

impl fmt::Display for HardDriveNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HD({},{},{},{:#x},{:#x})",
            self.partition_number,
            self.format,
            self.signature,
            self.partition_start,
            self.partition_size
        )
    }
}

/// File path within the filesystem, using `\` as separator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilePathNode {
    pub path: String,
}

impl FilePathNode {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for FilePathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// A single node of a [`DevicePath`](crate::DevicePath)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DevicePathNode {
    Acpi(AcpiNode),
    Pci(PciNode),
    NvmeNamespace(NvmeNamespaceNode),
    Sata(SataNode),
    HardDrive(HardDriveNode),
    FilePath(FilePathNode),
}

impl DevicePathNode {
    /// Whether this node describes hardware rather than media
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            Self::Acpi(_) | Self::Pci(_) | Self::NvmeNamespace(_) | Self::Sata(_)
        )
    }
}

impl fmt::Display for DevicePathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acpi(node) => node.fmt(f),
            Self::Pci(node) => node.fmt(f),
            Self::NvmeNamespace(node) => node.fmt(f),
            Self::Sata(node) => node.fmt(f),
            Self::HardDrive(node) => node.fmt(f),
            Self::FilePath(node) => node.fmt(f),
        }
    }
}

macro_rules! impl_from_node {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for DevicePathNode {
                fn from(node: $ty) -> Self {
                    Self::$variant(node)
                }
            }
        )*
    };
}

impl_from_node! {
    Acpi => AcpiNode,
    Pci => PciNode,
    NvmeNamespace => NvmeNamespaceNode,
    Sata => SataNode,
    HardDrive => HardDriveNode,
    FilePath => FilePathNode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pci_root_hid_matches_firmware_encoding() {
        assert_eq!(PCI_ROOT_HID, 0x0a03_41d0);
        assert_eq!(parse_eisa_id("PNP0A03"), Some(PCI_ROOT_HID));
        assert_eq!(parse_eisa_id("PNP0A08"), Some(PCIE_ROOT_HID));
    }

    #[test]
    fn rejects_malformed_eisa_ids() {
        assert_eq!(parse_eisa_id("pnp0a03"), None);
        assert_eq!(parse_eisa_id("PNP0A0"), None);
        assert_eq!(parse_eisa_id("PNP0AG3"), None);
        assert_eq!(parse_eisa_id("LNXSYSTM"), None);
    }

    #[test]
    fn renders_acpi_nodes() {
        let root = AcpiNode { hid: PCI_ROOT_HID, uid: 0 };
        assert_eq!(root.to_string(), "PciRoot(0x0)");

        let other = AcpiNode {
            hid: parse_eisa_id("PNP0C0A").unwrap(),
            uid: 2,
        };
        assert_eq!(other.to_string(), "Acpi(PNP0C0A,0x2)");
    }

    #[test]
    fn renders_storage_nodes() {
        let sata = SataNode {
            hba_port: 0,
            port_multiplier_port: SATA_NO_PORT_MULTIPLIER,
            lun: 0,
        };
        assert_eq!(sata.to_string(), "Sata(0x0,0xffff,0x0)");

        let nvme = NvmeNamespaceNode {
            namespace_id: 1,
            eui64: [0, 0x25, 0x38, 0, 0, 0, 0, 0x1a],
        };
        assert_eq!(nvme.to_string(), "NVMe(0x1,00-25-38-00-00-00-00-1A)");
    }

    #[test]
    fn node_serializes_with_type_tag() {
        let node = DevicePathNode::from(PciNode {
            device: 0x1d,
            function: 0,
        });
        let json = serde_json::to_value(&node).expect("serialize node");
        assert_eq!(json["type"], "pci");
        assert_eq!(json["device"], 0x1d);
    }
}
