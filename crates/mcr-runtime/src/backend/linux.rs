//! Linux native isolation backend using direct syscalls.

use std::path::Path;

use mcr_common::error::Result;
use mcr_core::filesystem::rootfs;
use mcr_core::namespace::{self, NamespaceSet, uts};

use super::IsolationBackend;

/// Backend that uses Linux kernel features directly.
///
/// Delegates to the `mcr-core` namespace, UTS and rootfs primitives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxIsolation;

impl LinuxIsolation {
    /// Creates a new Linux native backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl IsolationBackend for LinuxIsolation {
    fn isolate(&self, namespaces: NamespaceSet) -> Result<()> {
        namespace::isolate(namespaces)
    }

    fn set_hostname(&self, hostname: &str) -> Result<()> {
        uts::set_hostname(hostname)
    }

    fn confine(&self, rootfs: &Path) -> Result<()> {
        rootfs::confine(rootfs)
    }

    fn name(&self) -> &'static str {
        "linux-native"
    }
}
