// SPDX-License-Identifier: GPL-3.0-only

//! Symlink resolution under a configurable root directory

use std::collections::VecDeque;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{ErrorKind, Result};

/// Same limit the kernel applies before returning `ELOOP`.
const MAX_SYMLINK_HOPS: usize = 40;

/// Absolute, symlink-free path as seen from the lookup root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    /// Wrap a path already known to be canonical.
    #[cfg(test)]
    pub(crate) fn from_canonical(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Resolve `input` to a canonical path, following symlinks under `root`.
///
/// Relative inputs are taken relative to the current working directory.
/// Absolute symlink targets restart at `root`, never at the host `/`.
/// Every component must exist.
pub fn resolve_path(root: &Path, input: &Path) -> Result<ResolvedPath> {
    let not_found = |source: io::Error| ErrorKind::PathNotFound {
        path: input.to_path_buf(),
        source,
    };

    let absolute = if input.is_absolute() {
        input.to_path_buf()
    } else {
        env::current_dir()
            .map_err(|e| ErrorKind::io("cannot determine the working directory", e))?
            .join(input)
    };

    let mut pending: VecDeque<OsString> = VecDeque::new();
    push_components(&mut pending, &absolute);

    let mut resolved = PathBuf::from("/");
    let mut hops = 0usize;

    while let Some(name) = pending.pop_front() {
        if name == ".." {
            resolved.pop();
            continue;
        }

        let candidate = resolved.join(&name);
        let on_host = host_path(root, &candidate);
        let metadata = fs::symlink_metadata(&on_host).map_err(not_found)?;

        if metadata.file_type().is_symlink() {
            hops += 1;
            if hops > MAX_SYMLINK_HOPS {
                return Err(not_found(io::Error::from_raw_os_error(libc::ELOOP)));
            }

            let target = fs::read_link(&on_host).map_err(not_found)?;
            debug!(link = %candidate.display(), target = %target.display(), "following symlink");
            if target.is_absolute() {
                resolved = PathBuf::from("/");
            }

            let mut expanded = VecDeque::new();
            push_components(&mut expanded, &target);
            expanded.extend(pending);
            pending = expanded;
            continue;
        }

        if !metadata.is_dir() && !pending.is_empty() {
            return Err(not_found(io::Error::from_raw_os_error(libc::ENOTDIR)));
        }

        resolved = candidate;
    }

    Ok(ResolvedPath(resolved))
}

/// Queue the normal and parent components of `path`, dropping `.` and the root.
fn push_components(queue: &mut VecDeque<OsString>, path: &Path) {
    for component in path.components() {
        match component {
            Component::Normal(name) => queue.push_back(name.to_os_string()),
            Component::ParentDir => queue.push_back(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
}

fn host_path(root: &Path, logical: &Path) -> PathBuf {
    match logical.strip_prefix("/") {
        Ok(relative) => root.join(relative),
        Err(_) => root.join(logical),
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use tempfile::TempDir;

    use super::*;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("boot/efi/EFI/ubuntu")).unwrap();
        fs::write(dir.path().join("boot/efi/EFI/ubuntu/shimx64.efi"), b"shim").unwrap();
        dir
    }

    #[test]
    fn plain_path_resolves_to_itself() {
        let dir = tree();
        let resolved =
            resolve_path(dir.path(), Path::new("/boot/efi/EFI/ubuntu/shimx64.efi")).unwrap();
        assert_eq!(resolved.as_path(), Path::new("/boot/efi/EFI/ubuntu/shimx64.efi"));
    }

    #[test]
    fn dot_segments_are_normalized() {
        let dir = tree();
        let resolved = resolve_path(
            dir.path(),
            Path::new("/boot/./efi/EFI/../EFI/ubuntu/shimx64.efi"),
        )
        .unwrap();
        assert_eq!(resolved.as_path(), Path::new("/boot/efi/EFI/ubuntu/shimx64.efi"));
    }

    #[test]
    fn absolute_symlink_restarts_at_root() {
        let dir = tree();
        fs::create_dir_all(dir.path().join("foo")).unwrap();
        symlink("/boot/efi/EFI", dir.path().join("foo/bar")).unwrap();

        let resolved = resolve_path(dir.path(), Path::new("/foo/bar/ubuntu/shimx64.efi")).unwrap();
        assert_eq!(resolved.as_path(), Path::new("/boot/efi/EFI/ubuntu/shimx64.efi"));
    }

    #[test]
    fn relative_symlink_resolves_against_its_directory() {
        let dir = tree();
        symlink("EFI/ubuntu/shimx64.efi", dir.path().join("boot/efi/shim")).unwrap();

        let resolved = resolve_path(dir.path(), Path::new("/boot/efi/shim")).unwrap();
        assert_eq!(resolved.as_path(), Path::new("/boot/efi/EFI/ubuntu/shimx64.efi"));
    }

    #[test]
    fn missing_component_is_path_not_found() {
        let dir = tree();
        let err = resolve_path(dir.path(), Path::new("/boot/efi/EFI/fedora/shimx64.efi"))
            .unwrap_err();
        assert!(matches!(err, ErrorKind::PathNotFound { .. }));
    }

    #[test]
    fn symlink_cycle_is_path_not_found() {
        let dir = tree();
        symlink("/loop-b", dir.path().join("loop-a")).unwrap();
        symlink("/loop-a", dir.path().join("loop-b")).unwrap();

        let err = resolve_path(dir.path(), Path::new("/loop-a/file")).unwrap_err();
        match err {
            ErrorKind::PathNotFound { source, .. } => {
                assert_eq!(source.raw_os_error(), Some(libc::ELOOP));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_used_as_directory_is_rejected() {
        let dir = tree();
        let err = resolve_path(
            dir.path(),
            Path::new("/boot/efi/EFI/ubuntu/shimx64.efi/extra"),
        )
        .unwrap_err();
        assert!(matches!(err, ErrorKind::PathNotFound { .. }));
    }
}
