//! UTS namespace isolation.
//!
//! Allows the container to have its own hostname.

use mcr_common::error::Result;

/// Sets the hostname inside the UTS namespace.
///
/// Only meaningful once the calling process has detached its UTS
/// namespace; otherwise this renames the host.
///
/// # Errors
///
/// Returns [`McrError::Hostname`](mcr_common::error::McrError::Hostname)
/// if `sethostname(2)` fails.
#[cfg(target_os = "linux")]
pub fn set_hostname(hostname: &str) -> Result<()> {
    use mcr_common::error::McrError;

    nix::unistd::sethostname(hostname).map_err(|e| McrError::Hostname {
        hostname: hostname.to_string(),
        source: Some(e.into()),
    })?;
    tracing::debug!(hostname, "container hostname set");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error, UTS namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_hostname(_hostname: &str) -> Result<()> {
    Err(mcr_common::error::McrError::config(
        "Linux required for native container operations",
    ))
}
