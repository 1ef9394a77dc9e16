//! Linux namespace management for container isolation.
//!
//! Provides a composable [`NamespaceSet`] and a safe wrapper around
//! `unshare(2)` that detaches the calling process before it forks.

pub mod mount;
pub mod uts;

use std::fmt;

use mcr_common::error::Result;

/// A single kernel isolation domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Private mount table (`CLONE_NEWNS`).
    Mount,
    /// Private PID space (`CLONE_NEWPID`).
    Pid,
    /// Private hostname (`CLONE_NEWUTS`).
    Uts,
    /// Private network stack (`CLONE_NEWNET`).
    Network,
}

impl Namespace {
    /// All supported namespace kinds, in display order.
    pub const ALL: [Self; 4] = [Self::Mount, Self::Pid, Self::Uts, Self::Network];

    const fn bit(self) -> u8 {
        match self {
            Self::Mount => 1,
            Self::Pid => 1 << 1,
            Self::Uts => 1 << 2,
            Self::Network => 1 << 3,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Mount => "mount",
            Self::Pid => "pid",
            Self::Uts => "uts",
            Self::Network => "net",
        }
    }
}

/// A set of namespaces, stored as a bitmask.
///
/// Composition is a bitwise OR, so inclusion order does not matter and
/// duplicates collapse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NamespaceSet(u8);

impl NamespaceSet {
    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Mount, PID and UTS: the set every container gets.
    #[must_use]
    pub const fn container_default() -> Self {
        Self::empty()
            .with(Namespace::Mount)
            .with(Namespace::Pid)
            .with(Namespace::Uts)
    }

    /// Returns a copy with `ns` included.
    #[must_use]
    pub const fn with(self, ns: Namespace) -> Self {
        Self(self.0 | ns.bit())
    }

    /// Returns the union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` if `ns` is in the set.
    #[must_use]
    pub const fn contains(self, ns: Namespace) -> bool {
        self.0 & ns.bit() != 0
    }

    /// Returns `true` if no namespace is requested.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates over the included namespaces.
    pub fn iter(self) -> impl Iterator<Item = Namespace> {
        Namespace::ALL.into_iter().filter(move |ns| self.contains(*ns))
    }

    /// Converts to the kernel's `CLONE_NEW*` flags.
    #[cfg(target_os = "linux")]
    #[must_use]
    pub fn clone_flags(self) -> nix::sched::CloneFlags {
        use nix::sched::CloneFlags;

        self.iter().fold(CloneFlags::empty(), |flags, ns| {
            flags
                | match ns {
                    Namespace::Mount => CloneFlags::CLONE_NEWNS,
                    Namespace::Pid => CloneFlags::CLONE_NEWPID,
                    Namespace::Uts => CloneFlags::CLONE_NEWUTS,
                    Namespace::Network => CloneFlags::CLONE_NEWNET,
                }
        })
    }
}

impl std::ops::BitOr for NamespaceSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOr<Namespace> for NamespaceSet {
    type Output = Self;

    fn bitor(self, rhs: Namespace) -> Self {
        self.with(rhs)
    }
}

impl From<Namespace> for NamespaceSet {
    fn from(ns: Namespace) -> Self {
        Self::empty().with(ns)
    }
}

impl FromIterator<Namespace> for NamespaceSet {
    fn from_iter<I: IntoIterator<Item = Namespace>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl fmt::Display for NamespaceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.iter().map(Namespace::name).collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Detaches the calling process into new instances of `set`.
///
/// Must run before `fork(2)`: the new PID namespace only applies to
/// children created afterwards. When a mount namespace is requested the
/// root mount is also made recursively private, so mounts done by the
/// container never propagate back to the host.
///
/// # Errors
///
/// Returns [`McrError::Isolation`](mcr_common::error::McrError::Isolation)
/// if `unshare(2)` or the propagation change fails.
#[cfg(target_os = "linux")]
pub fn isolate(set: NamespaceSet) -> Result<()> {
    use mcr_common::error::McrError;
    use nix::sched::unshare;

    if set.is_empty() {
        return Ok(());
    }
    unshare(set.clone_flags()).map_err(|e| McrError::Isolation {
        message: format!("unshare({set}) failed"),
        source: Some(e.into()),
    })?;
    if set.contains(Namespace::Mount) {
        mount::make_root_private()?;
    }
    tracing::debug!(namespaces = %set, "namespaces isolated");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error, namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn isolate(_set: NamespaceSet) -> Result<()> {
    Err(mcr_common::error::McrError::config(
        "Linux required for native container operations",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_collapse() {
        let twice: NamespaceSet = [Namespace::Mount, Namespace::Mount, Namespace::Pid]
            .into_iter()
            .collect();
        let once: NamespaceSet = [Namespace::Mount, Namespace::Pid].into_iter().collect();
        assert_eq!(twice, once);
    }

    #[test]
    fn composition_is_order_independent_and_associative() {
        let a = NamespaceSet::from(Namespace::Mount);
        let b = NamespaceSet::from(Namespace::Uts);
        let c = NamespaceSet::from(Namespace::Network);
        assert_eq!((a | b) | c, a | (b | c));
        assert_eq!(a | b, b | a);
        assert_eq!((a | b) | (a | b), a | b);
    }

    #[test]
    fn container_default_has_mount_pid_uts() {
        let set = NamespaceSet::container_default();
        assert!(set.contains(Namespace::Mount));
        assert!(set.contains(Namespace::Pid));
        assert!(set.contains(Namespace::Uts));
        assert!(!set.contains(Namespace::Network));
        assert_eq!(set.to_string(), "mount|pid|uts");
    }

    #[test]
    fn empty_set_displays_none() {
        assert_eq!(NamespaceSet::empty().to_string(), "none");
        assert!(NamespaceSet::empty().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn clone_flags_match_kernel_constants() {
        use nix::sched::CloneFlags;

        let flags = (NamespaceSet::container_default() | Namespace::Network).clone_flags();
        assert_eq!(
            flags,
            CloneFlags::CLONE_NEWNS
                | CloneFlags::CLONE_NEWPID
                | CloneFlags::CLONE_NEWUTS
                | CloneFlags::CLONE_NEWNET
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn empty_set_isolation_is_a_no_op() {
        assert!(isolate(NamespaceSet::empty()).is_ok());
    }
}
