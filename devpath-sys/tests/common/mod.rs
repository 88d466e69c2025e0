// SPDX-License-Identifier: GPL-3.0-only

//! Fixture trees standing in for the host root, mount table, sysfs and disks.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor};
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use devpath_sys::{BlockDevice, LookupRoots, Translator};
use tempfile::TempDir;

pub const SECTOR: usize = 512;

/// Unique GUID of partition 1 in [`gpt_image`], on-disk byte order.
pub const ESP_GUID_BYTES: [u8; 16] = [
    0x7e, 0x90, 0xa2, 0xc7, 0xc9, 0xd8, 0x41, 0x4a, 0x8b, 0x99, 0x3e, 0xf3, 0x24, 0x5f, 0xaf, 0x2a,
];
pub const ESP_GUID: &str = "c7a2907e-d8c9-4a41-8b99-3ef3245faf2a";

pub const MOUNTS_NVME: &str = "\
22 1 259:2 / / rw,relatime shared:1 - ext4 /dev/nvme0n1p2 rw
28 22 259:1 / /boot/efi rw,relatime shared:5 - vfat /dev/nvme0n1p1 rw,fmask=0077
29 22 259:1 /EFI /efi rw,relatime shared:5 - vfat /dev/nvme0n1p1 rw,fmask=0077
31 22 7:1 / /snap/core/11993 ro,nodev,relatime shared:7 - squashfs /dev/loop1 ro
";

pub const MOUNTS_SATA: &str = "\
/dev/sda2 / ext4 rw,relatime 0 0
/dev/sda1 /boot/efi vfat rw,relatime,fmask=0077 0 0
";

pub struct Fixture {
    dir: TempDir,
    images: HashMap<PathBuf, Vec<u8>>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create fixture dir");
        fs::create_dir_all(dir.path().join("root")).unwrap();
        fs::create_dir_all(dir.path().join("sys/class/block")).unwrap();
        fs::create_dir_all(dir.path().join("sys/devices")).unwrap();
        Self {
            dir,
            images: HashMap::new(),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("root")
    }

    pub fn sysfs(&self) -> PathBuf {
        self.dir.path().join("sys")
    }

    /// Canonical sysfs location, as reported in topology errors.
    pub fn canonical_sysfs(&self) -> PathBuf {
        fs::canonicalize(self.sysfs()).unwrap()
    }

    /// Create a regular file at `logical` below the fake root.
    pub fn file(&self, logical: &str) -> &Self {
        let path = self.root().join(logical.trim_start_matches('/'));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"payload").unwrap();
        self
    }

    pub fn symlink(&self, logical: &str, target: &str) -> &Self {
        let path = self.root().join(logical.trim_start_matches('/'));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        symlink(target, path).unwrap();
        self
    }

    pub fn mounts(&self, table: &str) -> &Self {
        fs::write(self.dir.path().join("mountinfo"), table).unwrap();
        self
    }

    pub fn sys_dir(&self, rel: &str) -> &Self {
        fs::create_dir_all(self.sysfs().join(rel)).unwrap();
        self
    }

    pub fn sys_attr(&self, rel: &str, value: &str) -> &Self {
        let path = self.sysfs().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("{value}\n")).unwrap();
        self
    }

    pub fn sys_link(&self, rel: &str, target: &str) -> &Self {
        let path = self.sysfs().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        symlink(target, path).unwrap();
        self
    }

    /// Register the bytes returned when `device` is opened.
    pub fn image(&mut self, device: &str, bytes: Vec<u8>) -> &mut Self {
        self.images.insert(PathBuf::from(device), bytes);
        self
    }

    pub fn roots(&self) -> LookupRoots {
        LookupRoots {
            root_dir: self.root(),
            mounts_path: self.dir.path().join("mountinfo"),
            sysfs_path: self.sysfs(),
        }
    }

    pub fn translator(&self) -> Translator {
        let images = self.images.clone();
        Translator::new(self.roots()).with_opener(
            move |path: &Path| -> io::Result<Box<dyn BlockDevice>> {
                match images.get(path) {
                    Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
                    None => Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no image for {}", path.display()),
                    )),
                }
            },
        )
    }

    /// Host files used by the scenarios: an ESP binary, a bind-mounted view
    /// of it, a symlink into the bind mount, and a file on a loop mount.
    pub fn with_standard_files(&self) -> &Self {
        self.file("/boot/efi/EFI/ubuntu/shimx64.efi")
            .file("/efi/ubuntu/shimx64.efi")
            .symlink("/foo/bar/shimx64.efi", "/efi/ubuntu/shimx64.efi")
            .file("/snap/core/11993/bin/ls")
    }

    /// Device topology of an NVMe disk, a SATA disk and a loop device.
    pub fn with_standard_sysfs(&self) -> &Self {
        let nvme = "devices/pci0000:00/0000:00:1d.0/0000:3d:00.0/nvme/nvme0/nvme0n1";
        let sata = "devices/pci0000:00/0000:00:1f.2/ata1/host0/target0:0:0/0:0:0:0/block/sda";

        self.sys_attr("devices/LNXSYSTM:00/LNXSYBUS:00/PNP0A08:00/hid", "PNP0A08")
            .sys_attr("devices/LNXSYSTM:00/LNXSYBUS:00/PNP0A08:00/uid", "0")
            .sys_link(
                "devices/pci0000:00/firmware_node",
                "../LNXSYSTM:00/LNXSYBUS:00/PNP0A08:00",
            )
            .sys_attr(&format!("{nvme}/nsid"), "1")
            .sys_attr(&format!("{nvme}/nvme0n1p1/partition"), "1")
            .sys_attr(&format!("{nvme}/nvme0n1p2/partition"), "2")
            .sys_link("class/block/nvme0n1", &format!("../../{nvme}"))
            .sys_link("class/block/nvme0n1p1", &format!("../../{nvme}/nvme0n1p1"))
            .sys_link("class/block/nvme0n1p2", &format!("../../{nvme}/nvme0n1p2"))
            .sys_attr(
                "devices/pci0000:00/0000:00:1f.2/ata1/ata_port/ata1/port_no",
                "1",
            )
            .sys_attr(&format!("{sata}/sda1/partition"), "1")
            .sys_link("class/block/sda", &format!("../../{sata}"))
            .sys_link("class/block/sda1", &format!("../../{sata}/sda1"))
            .sys_dir("devices/virtual/block/loop1")
            .sys_link("class/block/loop1", "../../devices/virtual/block/loop1")
    }
}

fn gpt_header(
    my_lba: u64,
    alternate_lba: u64,
    entries_lba: u64,
    last_usable: u64,
    entries_crc: u32,
) -> Vec<u8> {
    let mut header = vec![0u8; SECTOR];
    header[0..8].copy_from_slice(b"EFI PART");
    header[8..12].copy_from_slice(&0x0001_0000u32.to_le_bytes());
    header[12..16].copy_from_slice(&92u32.to_le_bytes());
    header[24..32].copy_from_slice(&my_lba.to_le_bytes());
    header[32..40].copy_from_slice(&alternate_lba.to_le_bytes());
    header[40..48].copy_from_slice(&34u64.to_le_bytes());
    header[48..56].copy_from_slice(&last_usable.to_le_bytes());
    header[72..80].copy_from_slice(&entries_lba.to_le_bytes());
    header[80..84].copy_from_slice(&128u32.to_le_bytes());
    header[84..88].copy_from_slice(&128u32.to_le_bytes());
    header[88..92].copy_from_slice(&entries_crc.to_le_bytes());
    let crc = crc32fast::hash(&header[..92]);
    header[16..20].copy_from_slice(&crc.to_le_bytes());
    header
}

/// 131 sector GPT disk with one partition at LBA 34 spanning 64 sectors.
pub fn gpt_image() -> Vec<u8> {
    const TOTAL: usize = 131;
    let mut disk = vec![0u8; TOTAL * SECTOR];

    disk[446 + 4] = 0xee;
    disk[446 + 8..446 + 12].copy_from_slice(&1u32.to_le_bytes());
    disk[510] = 0x55;
    disk[511] = 0xaa;

    let mut entries = vec![0u8; 128 * 128];
    entries[0..16].copy_from_slice(&[
        0x28, 0x73, 0x2a, 0xc1, 0x1f, 0xf8, 0xd2, 0x11, 0xba, 0x4b, 0x00, 0xa0, 0xc9, 0x3e, 0xc9,
        0x3b,
    ]);
    entries[16..32].copy_from_slice(&ESP_GUID_BYTES);
    entries[32..40].copy_from_slice(&34u64.to_le_bytes());
    entries[40..48].copy_from_slice(&97u64.to_le_bytes());
    let entries_crc = crc32fast::hash(&entries);

    let last_lba = (TOTAL - 1) as u64;
    let backup_entries_lba = last_lba - 32;

    disk[SECTOR..2 * SECTOR].copy_from_slice(&gpt_header(1, last_lba, 2, 97, entries_crc));
    disk[2 * SECTOR..2 * SECTOR + entries.len()].copy_from_slice(&entries);

    let at = backup_entries_lba as usize * SECTOR;
    disk[at..at + entries.len()].copy_from_slice(&entries);
    disk[last_lba as usize * SECTOR..]
        .copy_from_slice(&gpt_header(last_lba, 1, backup_entries_lba, 97, entries_crc));

    disk
}

/// Small MBR disk: partition 1 at LBA 2048 spanning 4096 sectors.
pub fn mbr_image(disk_signature: u32) -> Vec<u8> {
    let mut disk = vec![0u8; 4 * SECTOR];
    disk[440..444].copy_from_slice(&disk_signature.to_le_bytes());
    disk[446 + 4] = 0x0c;
    disk[446 + 8..446 + 12].copy_from_slice(&2048u32.to_le_bytes());
    disk[446 + 12..446 + 16].copy_from_slice(&4096u32.to_le_bytes());
    disk[510] = 0x55;
    disk[511] = 0xaa;
    disk
}
