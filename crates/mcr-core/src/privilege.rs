//! Privilege checks.
//!
//! Namespace, mount and cgroup operations all require the host superuser;
//! the runtime refuses to start otherwise instead of failing half-way.

use mcr_common::error::{McrError, Result};

/// Effective uid of the host superuser.
pub const ROOT_UID: u32 = 0;

/// Returns the effective uid of the calling process.
#[cfg(target_os = "linux")]
#[must_use]
pub fn effective_uid() -> u32 {
    nix::unistd::geteuid().as_raw()
}

/// Stub for non-Linux platforms; reports an unprivileged uid.
#[cfg(not(target_os = "linux"))]
#[must_use]
pub const fn effective_uid() -> u32 {
    u32::MAX
}

/// Checks that `euid` belongs to the superuser.
///
/// # Errors
///
/// Returns [`McrError::Privilege`] for any other uid.
pub fn require_root(euid: u32) -> Result<()> {
    if euid == ROOT_UID {
        Ok(())
    } else {
        Err(McrError::Privilege { euid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_accepted() {
        assert!(require_root(0).is_ok());
    }

    #[test]
    fn regular_user_is_rejected() {
        assert!(matches!(
            require_root(1000),
            Err(McrError::Privilege { euid: 1000 })
        ));
    }
}
