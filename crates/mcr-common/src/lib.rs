//! # mcr-common
//!
//! Shared types, error definitions, configuration snapshot, and constants
//! used across the mcr workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and carries no OS bindings.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
