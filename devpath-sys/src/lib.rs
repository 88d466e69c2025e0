// SPDX-License-Identifier: GPL-3.0-only

//! Map files on local Linux storage to UEFI device paths
//!
//! A translation runs these stages in order, each failing with its own
//! [`ErrorKind`]:
//!
//! 1. **path**: resolve symlinks and `.`/`..` segments
//! 2. **mounts**: find the mount holding the file and its in-filesystem path
//! 3. **partition**: read the disk's GPT (or MBR) to locate the partition
//! 4. **sysfs**: walk the kernel device topology for the hardware path
//! 5. **compose**: assemble the nodes for the requested [`Mode`]
//!
//! The host locations read by these stages are [`LookupRoots`] held by a
//! [`Translator`], so fixture trees can stand in for `/proc`, `/sys` and
//! `/dev`.

pub mod compose;
pub mod config;
pub mod device;
pub mod error;
pub mod mounts;
pub mod partition;
pub mod path;
pub mod sysfs;
pub mod translate;

pub use compose::Mode;
pub use config::{ConfigError, LookupRoots};
pub use device::{BlockDevice, BlockDeviceOpener, FileOpener};
pub use error::{ErrorKind, Result, TranslateError};
pub use partition::{PartitionInfo, PartitionScheme};
pub use sysfs::{BusHandler, HandlerRegistry, TopologyNode};
pub use translate::{Translator, translate};

pub use devpath_types as types;
