//! Mount namespace propagation.
//!
//! A fresh mount namespace inherits shared propagation from the host on
//! most systemd distributions. Remounting `/` as recursively private keeps
//! the container's bind mounts out of the host mount table.

use mcr_common::error::Result;

/// Marks every mount in the calling namespace as private.
///
/// # Errors
///
/// Returns an isolation error if the `mount(2)` syscall fails.
#[cfg(target_os = "linux")]
pub fn make_root_private() -> Result<()> {
    use mcr_common::error::McrError;
    use nix::mount::{MsFlags, mount};

    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| McrError::Isolation {
        message: "failed to make / recursively private".into(),
        source: Some(e.into()),
    })?;
    tracing::debug!("mount propagation set to private");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error, mount namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn make_root_private() -> Result<()> {
    Err(mcr_common::error::McrError::config(
        "Linux required for native container operations",
    ))
}
