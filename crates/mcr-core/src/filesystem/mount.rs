//! Mount utilities for container filesystem setup.
//!
//! Handles bind mounts and mount-point detection through
//! `/proc/self/mountinfo`.

use std::path::{Path, PathBuf};

use mcr_common::error::{McrError, Result};

/// Mount table of the calling process.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Creates a recursive bind mount from source to target.
///
/// # Errors
///
/// Returns [`McrError::Rootfs`] if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    use nix::mount::{MsFlags, mount};

    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| McrError::Rootfs {
        path: target.to_path_buf(),
        message: format!("bind mount from {} failed: {e}", source.display()),
    })?;
    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        "bind mount created"
    );
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error, bind mounts require Linux.
#[cfg(not(target_os = "linux"))]
pub fn bind_mount(_source: &Path, _target: &Path) -> Result<()> {
    Err(McrError::config("Linux required for native container operations"))
}

/// Returns `true` if `path` is listed as a mount point in the calling
/// process's mount table.
///
/// # Errors
///
/// Returns an error if the mount table cannot be read.
pub fn is_mount_point(path: &Path) -> Result<bool> {
    let table = std::fs::read_to_string(MOUNTINFO_PATH).map_err(|e| McrError::Io {
        path: PathBuf::from(MOUNTINFO_PATH),
        source: e,
    })?;
    Ok(mount_points(&table).any(|p| p == path))
}

/// Iterates over the mount points (fifth field) of a mountinfo table.
pub fn mount_points(table: &str) -> impl Iterator<Item = PathBuf> + '_ {
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(|field| PathBuf::from(unescape_octal(field)))
}

/// Decodes the `\NNN` octal escapes the kernel uses for spaces, tabs,
/// newlines and backslashes in mountinfo paths.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 4])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 8).ok());
            if let Some(value) = decoded {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
