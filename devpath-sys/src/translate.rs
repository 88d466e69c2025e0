// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use devpath_types::{DevicePath, FilePathNode};
use tracing::{debug, info};

use crate::compose::{Mode, compose};
use crate::config::LookupRoots;
use crate::device::{BlockDeviceOpener, FileOpener};
use crate::error::{Result, TranslateError};
use crate::mounts::{read_mount_table, select_mount};
use crate::partition::{identify_device, locate_partition};
use crate::path::resolve_path;
use crate::sysfs::{HandlerRegistry, walk_topology};

/// Maps files to UEFI device paths using a fixed set of lookup roots
///
/// A translator holds configuration only. It can be shared between threads
/// and every call to [`translate`](Self::translate) is independent.
#[derive(Clone)]
pub struct Translator {
    roots: LookupRoots,
    opener: Arc<dyn BlockDeviceOpener>,
    handlers: Arc<HandlerRegistry>,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(LookupRoots::default())
    }
}

impl fmt::Debug for Translator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Translator")
            .field("roots", &self.roots)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl Translator {
    pub fn new(roots: LookupRoots) -> Self {
        Self {
            roots,
            opener: Arc::new(FileOpener),
            handlers: Arc::new(HandlerRegistry::default()),
        }
    }

    /// Replace the function used to open whole-disk devices.
    pub fn with_opener(mut self, opener: impl BlockDeviceOpener + 'static) -> Self {
        self.opener = Arc::new(opener);
        self
    }

    /// Replace the topology handler registry.
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn roots(&self) -> &LookupRoots {
        &self.roots
    }

    /// Map `path` to a device path of the requested form.
    pub fn translate(&self, path: impl AsRef<Path>, mode: Mode) -> std::result::Result<DevicePath, TranslateError> {
        let path = path.as_ref();
        let device_path = self.run(path, mode)?;
        info!(path = %path.display(), %mode, device_path = %device_path, "mapped file to device path");
        Ok(device_path)
    }

    fn run(&self, path: &Path, mode: Mode) -> Result<DevicePath> {
        let resolved = resolve_path(&self.roots.root_dir, path)?;
        debug!(input = %path.display(), resolved = %resolved.as_path().display(), "resolved path");

        let entries = read_mount_table(&self.roots.mounts_path)?;
        let mount = select_mount(&entries, &resolved)?;
        let file = FilePathNode::new(mount.efi_path());

        if !mode.needs_partition() {
            return compose(mode, &[], None, file);
        }

        let disk = identify_device(
            &mount.entry.device,
            &self.roots.root_dir,
            &self.roots.sysfs_path,
        );
        let topology = if mode.needs_topology() {
            walk_topology(&self.roots.sysfs_path, &disk.disk_name, &self.handlers)?
        } else {
            Vec::new()
        };
        let partition = locate_partition(&disk, self.opener.as_ref(), &self.roots.sysfs_path)?;

        compose(mode, &topology, partition.as_ref(), file)
    }
}

/// Map `path` to a device path using the host's lookup roots.
pub fn translate(path: impl AsRef<Path>, mode: Mode) -> std::result::Result<DevicePath, TranslateError> {
    Translator::default().translate(path, mode)
}
