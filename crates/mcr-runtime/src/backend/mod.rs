//! Isolation backend abstraction.
//!
//! The supervisor drives the launch pipeline; the backend performs the
//! privileged steps. Swapping the backend lets the fork/handshake/wait
//! machinery run without root, e.g. in tests.

pub mod linux;

use std::path::Path;

use mcr_common::error::Result;
use mcr_core::namespace::NamespaceSet;

/// Privileged isolation steps of the launch pipeline.
///
/// [`isolate`](Self::isolate) runs in the supervisor before fork;
/// [`set_hostname`](Self::set_hostname) and [`confine`](Self::confine) run
/// in the forked child, which reports their failure only through its exit
/// code. Implementations must therefore not rely on locks that another
/// thread of the parent could hold at fork time in the child-side methods.
pub trait IsolationBackend: Send + Sync {
    /// Detaches the calling process into the requested namespaces.
    ///
    /// # Errors
    ///
    /// Returns an isolation error if the kernel rejects the request.
    fn isolate(&self, namespaces: NamespaceSet) -> Result<()>;

    /// Sets the hostname inside the detached UTS namespace.
    ///
    /// # Errors
    ///
    /// Returns a hostname error if the kernel rejects the name.
    fn set_hostname(&self, hostname: &str) -> Result<()>;

    /// Confines the calling process to `rootfs`.
    ///
    /// # Errors
    ///
    /// Returns a rootfs error if preparation, mounting or `chroot` fails.
    fn confine(&self, rootfs: &Path) -> Result<()>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Creates the backend for the current platform.
#[must_use]
pub fn default_backend() -> Box<dyn IsolationBackend> {
    Box::new(linux::LinuxIsolation::new())
}
