// SPDX-License-Identifier: GPL-3.0-only

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Cause of a failed translation, one variant per pipeline stage
#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("cannot resolve path {}: {source}", .path.display())]
    PathNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot find the mount point for {}", .path.display())]
    MountNotFound { path: PathBuf },

    #[error("invalid partition table on {}: {reason}", .device.display())]
    PartitionTable { device: PathBuf, reason: String },

    #[error("file is not inside partitioned media - use the short-form file path mode")]
    UnpartitionedMedia,

    #[error(
        "encountered an error when handling components {components} from device path {}: [handler {handler}]: unsupported device: {reason}",
        .path.display()
    )]
    UnsupportedDevice {
        handler: String,
        components: String,
        path: PathBuf,
        reason: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ErrorKind {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn partition_table(device: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PartitionTable {
            device: device.into(),
            reason: reason.into(),
        }
    }
}

/// Error returned by [`Translator::translate`](crate::Translator::translate)
#[derive(Error, Debug)]
#[error("cannot map file path to a UEFI device path: {kind}")]
pub struct TranslateError {
    kind: ErrorKind,
}

impl TranslateError {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }
}

impl From<ErrorKind> for TranslateError {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

/// Result type alias for pipeline stages
pub type Result<T> = std::result::Result<T, ErrorKind>;
