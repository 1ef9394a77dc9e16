//! # mcr-core
//!
//! Low-level Linux isolation primitives for the mcr runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: mount, PID, UTS and network isolation via `unshare(2)`.
//! - **Filesystem**: bind mounts and `chroot`-based root confinement.
//! - **Cgroups v2**: memory and CPU limits, process membership.
//! - **Privilege**: superuser checks.
//!
//! Every function maps OS failures to exactly one
//! [`McrError`](mcr_common::error::McrError) variant.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
pub mod privilege;
