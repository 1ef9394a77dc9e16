//! Filesystem management for container isolation.
//!
//! Provides the bind-mount and mount table utilities plus the
//! chroot-based root confinement used by the container child.

pub mod mount;
pub mod rootfs;
