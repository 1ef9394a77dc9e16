//! Root filesystem confinement.
//!
//! Bind-mounts the rootfs onto itself so it has its own entry in the
//! private mount table, then `chroot(2)`s into it. Runs in the container
//! child, after the mount namespace was detached and before exec.

use std::path::{Path, PathBuf};

use mcr_common::error::{McrError, Result};

use super::mount;

/// Ensures the rootfs directory exists and returns its canonical path.
///
/// # Errors
///
/// Returns [`McrError::Rootfs`] if the directory cannot be created or
/// resolved.
pub fn prepare(rootfs: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(rootfs).map_err(|e| McrError::Rootfs {
        path: rootfs.to_path_buf(),
        message: format!("failed to create directory: {e}"),
    })?;
    let canonical = rootfs.canonicalize().map_err(|e| McrError::Rootfs {
        path: rootfs.to_path_buf(),
        message: format!("failed to resolve path: {e}"),
    })?;
    tracing::debug!(rootfs = %canonical.display(), "rootfs prepared");
    Ok(canonical)
}

/// Bind-mounts `rootfs` onto itself unless it already is a mount point.
///
/// Returns `true` if a new mount was created.
///
/// # Errors
///
/// Returns [`McrError::Rootfs`] if the mount table cannot be read or the
/// bind mount fails.
pub fn ensure_mount_point(rootfs: &Path) -> Result<bool> {
    let mounted = mount::is_mount_point(rootfs).map_err(|e| McrError::Rootfs {
        path: rootfs.to_path_buf(),
        message: e.to_string(),
    })?;
    if mounted {
        tracing::debug!(rootfs = %rootfs.display(), "rootfs already a mount point");
        return Ok(false);
    }
    mount::bind_mount(rootfs, rootfs)?;
    Ok(true)
}

/// Changes the root directory to `rootfs` and the working directory to `/`.
///
/// # Errors
///
/// Returns [`McrError::Rootfs`] if `chdir(2)` or `chroot(2)` fails.
#[cfg(target_os = "linux")]
pub fn enter_root(rootfs: &Path) -> Result<()> {
    use nix::unistd::{chdir, chroot};

    let fail = |step: &str, e: nix::Error| McrError::Rootfs {
        path: rootfs.to_path_buf(),
        message: format!("{step} failed: {e}"),
    };
    chdir(rootfs).map_err(|e| fail("chdir", e))?;
    chroot(".").map_err(|e| fail("chroot", e))?;
    chdir("/").map_err(|e| fail("chdir /", e))?;
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error, root confinement requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn enter_root(_rootfs: &Path) -> Result<()> {
    Err(McrError::config("Linux required for native container operations"))
}

/// Confines the calling process to `rootfs`.
///
/// # Errors
///
/// Returns [`McrError::Rootfs`] if any step fails.
pub fn confine(rootfs: &Path) -> Result<()> {
    let root = prepare(rootfs)?;
    let _ = ensure_mount_point(&root)?;
    enter_root(&root)?;
    tracing::debug!(rootfs = %root.display(), "root filesystem confined");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let rootfs = tmp.path().join("nested").join("rootfs");
        let canonical = prepare(&rootfs).unwrap();
        assert!(rootfs.is_dir());
        assert_eq!(canonical, rootfs.canonicalize().unwrap());
    }

    #[test]
    fn prepare_accepts_existing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(prepare(tmp.path()).is_ok());
        assert!(prepare(tmp.path()).is_ok());
    }

    #[test]
    fn prepare_fails_when_path_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        let err = prepare(&file.join("rootfs")).unwrap_err();
        assert!(matches!(err, McrError::Rootfs { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn existing_mount_point_is_not_remounted() {
        // `/` is always mounted, so no bind mount is attempted and no
        // privilege is required.
        assert!(!ensure_mount_point(Path::new("/")).unwrap());
    }

    /// Runs `steps` in a forked child holding its own mount namespace and
    /// returns the child's exit code.
    #[cfg(target_os = "linux")]
    #[allow(unsafe_code)]
    fn in_private_mount_namespace(steps: impl FnOnce() -> i32) -> i32 {
        use nix::sys::wait::{WaitStatus, waitpid};
        use nix::unistd::{ForkResult, fork};

        use crate::namespace::{self, Namespace, NamespaceSet};

        // SAFETY: the child runs `steps` and leaves through `_exit`.
        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                let code = match namespace::isolate(NamespaceSet::from(Namespace::Mount)) {
                    Ok(()) => steps(),
                    Err(_) => 100,
                };
                // SAFETY: skips the test harness's exit handlers.
                unsafe { libc::_exit(code) }
            }
            ForkResult::Parent { child } => match waitpid(child, None).unwrap() {
                WaitStatus::Exited(_, code) => code,
                _ => -1,
            },
        }
    }

    #[cfg(target_os = "linux")]
    fn mount_entries(path: &Path) -> usize {
        let table = std::fs::read_to_string("/proc/self/mountinfo").unwrap();
        crate::filesystem::mount::mount_points(&table)
            .filter(|p| p == path)
            .count()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn bind_mounted_rootfs_is_confined_without_second_mount() {
        if crate::privilege::effective_uid() != 0 {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let rootfs = tmp.path().canonicalize().unwrap();

        let code = in_private_mount_namespace(|| {
            if !matches!(ensure_mount_point(&rootfs), Ok(true)) {
                return 1;
            }
            if !matches!(ensure_mount_point(&rootfs), Ok(false)) {
                return 2;
            }
            if mount_entries(&rootfs) != 1 {
                return 3;
            }
            if confine(&rootfs).is_err() {
                return 4;
            }
            match std::env::current_dir() {
                Ok(cwd) if cwd == Path::new("/") => 0,
                _ => 5,
            }
        });
        assert_eq!(code, 0);
        assert_eq!(mount_entries(&rootfs), 0, "mount leaked into the test's namespace");
    }
}
