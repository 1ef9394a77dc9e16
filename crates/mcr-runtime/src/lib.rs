//! Container launch pipeline for the mcr runtime.
//!
//! [`Runtime`](runtime::Runtime) checks privileges and prepares a
//! [`Supervisor`](supervisor::Supervisor), which isolates, forks, confines,
//! limits, releases and reaps one container process.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod barrier;
pub mod events;
pub mod exit_code;
pub mod process;
pub mod runtime;
pub mod state;
pub mod supervisor;
