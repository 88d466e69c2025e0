// SPDX-License-Identifier: GPL-3.0-only

//! Raw access to whole-disk block devices
//!
//! The partition locator only needs to seek and read sectors, so devices are
//! handed out as [`BlockDevice`] trait objects by a [`BlockDeviceOpener`].
//! The default opener opens the device node read-only.

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::os::fd::AsRawFd;
use std::path::Path;

use tracing::debug;

/// Readable, seekable view of a disk
pub trait BlockDevice: Read + Seek + Send {
    /// Logical sector size reported by the device itself, if any
    fn logical_block_size(&self) -> Option<u64> {
        None
    }
}

impl BlockDevice for File {
    fn logical_block_size(&self) -> Option<u64> {
        // linux/fs.h: BLKSSZGET = _IO(0x12, 104)
        const BLKSSZGET: libc::c_ulong = 0x1268;
        let mut size: libc::c_int = 0;

        // SAFETY: BLKSSZGET writes a single c_int through the pointer.
        let ret = unsafe { libc::ioctl(self.as_raw_fd(), BLKSSZGET as _, &mut size) };
        if ret < 0 {
            debug!("BLKSSZGET failed: {}", io::Error::last_os_error());
            return None;
        }
        u64::try_from(size).ok()
    }
}

impl<T: AsRef<[u8]> + Send> BlockDevice for Cursor<T> {}

/// Opens the whole-disk device backing a partition
pub trait BlockDeviceOpener: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<Box<dyn BlockDevice>>;
}

impl<F> BlockDeviceOpener for F
where
    F: Fn(&Path) -> io::Result<Box<dyn BlockDevice>> + Send + Sync,
{
    fn open(&self, path: &Path) -> io::Result<Box<dyn BlockDevice>> {
        self(path)
    }
}

/// Opens device nodes on the host filesystem read-only
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOpener;

impl BlockDeviceOpener for FileOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn BlockDevice>> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Box::new(file))
    }
}

/// Read exactly `buf.len()` bytes starting at byte `offset`.
pub(crate) fn read_exact_at(
    device: &mut dyn BlockDevice,
    offset: u64,
    buf: &mut [u8],
) -> io::Result<()> {
    device.seek(SeekFrom::Start(offset))?;
    device.read_exact(buf)
}

/// Read `count` sectors starting at `lba`.
pub(crate) fn read_sectors(
    device: &mut dyn BlockDevice,
    sector_size: u64,
    lba: u64,
    count: u64,
) -> io::Result<Vec<u8>> {
    let len = sector_size
        .checked_mul(count)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "read length overflows"))?;
    let offset = lba
        .checked_mul(sector_size)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "sector offset overflows"))?;

    let mut buf = vec![0u8; len];
    read_exact_at(device, offset, &mut buf)?;
    Ok(buf)
}

/// Size of the device in bytes.
pub(crate) fn device_size(device: &mut dyn BlockDevice) -> io::Result<u64> {
    device.seek(SeekFrom::End(0))
}
