//! Process supervisor: drives one container launch from isolation to exit.
//!
//! The supervisor process and the forked child run two small state machines
//! joined by the ready/release handshake in [`crate::barrier`]. Resource
//! limits are in force before the child is released, and a child whose
//! limits could not be applied is killed without ever running the target.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mcr_common::error::{McrError, Result};
use mcr_common::types::{ContainerSpec, ExitStatus, LifecycleState};
use mcr_core::cgroup::CgroupManager;
use mcr_core::namespace::NamespaceSet;
use nix::unistd::{ForkResult, fork};
use serde::Serialize;

use crate::backend::IsolationBackend;
use crate::barrier::{Handshake, ParentEnd};
use crate::events::{LifecycleEvent, LifecycleObserver};
use crate::exit_code::ChildExit;
use crate::process::{self, ChildPlan, WaitOutcome};
use crate::state::ManagedProcess;

/// Summary of a completed launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Child pid in the supervisor's PID namespace.
    pub pid: u32,
    /// How the target command terminated.
    pub status: ExitStatus,
    /// Whether the deadline expired and the child was killed.
    pub timed_out: bool,
    /// Cgroup the child ran in, if limits were requested.
    pub cgroup: Option<String>,
    /// When the launch started.
    pub started_at: DateTime<Utc>,
    /// When the child was reaped.
    pub finished_at: DateTime<Utc>,
}

struct Launch {
    pid: u32,
    outcome: WaitOutcome,
    cgroup: Option<String>,
}

/// Supervises a single container launch.
///
/// Built by [`Runtime::prepare`](crate::runtime::Runtime::prepare).
pub struct Supervisor {
    spec: ContainerSpec,
    namespaces: NamespaceSet,
    cgroup_root: PathBuf,
    deadline: Option<Duration>,
    heartbeat: Option<Duration>,
    backend: Arc<dyn IsolationBackend>,
    observer: Arc<dyn LifecycleObserver>,
    process: ManagedProcess,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("spec", &self.spec)
            .field("namespaces", &self.namespaces)
            .field("cgroup_root", &self.cgroup_root)
            .field("deadline", &self.deadline)
            .field("backend", &self.backend.name())
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Creates a supervisor in the `Created` state.
    #[must_use]
    pub fn new(
        spec: ContainerSpec,
        namespaces: NamespaceSet,
        cgroup_root: PathBuf,
        backend: Arc<dyn IsolationBackend>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        Self {
            spec,
            namespaces,
            cgroup_root,
            deadline: None,
            heartbeat: None,
            backend,
            observer,
            process: ManagedProcess::new(),
        }
    }

    /// Kills the child if it is still running after `deadline`.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Emits a heartbeat event every `interval` while waiting.
    #[must_use]
    pub const fn with_heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat = interval;
        self
    }

    /// The container being launched.
    #[must_use]
    pub const fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    /// Namespaces the launch detaches into.
    #[must_use]
    pub const fn namespaces(&self) -> NamespaceSet {
        self.namespaces
    }

    /// Deadline for the target command, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.process.state()
    }

    /// Supervisor-side record of the child.
    #[must_use]
    pub const fn process(&self) -> &ManagedProcess {
        &self.process
    }

    /// Runs the launch to completion.
    ///
    /// Returns the child's status once it has been reaped and its cgroup
    /// removed. A target command that exits non-zero is a successful launch.
    ///
    /// # Errors
    ///
    /// - [`McrError::InvalidSpec`] before anything is forked.
    /// - [`McrError::Isolation`] or [`McrError::Fork`] from the supervisor.
    /// - [`McrError::Hostname`], [`McrError::Rootfs`] or [`McrError::Exec`]
    ///   decoded from the child's reserved exit code.
    /// - [`McrError::ResourceLimit`] after the child has been killed.
    pub fn run(&mut self) -> Result<RunReport> {
        let started_at = Utc::now();
        match self.launch() {
            Ok(launch) => Ok(RunReport {
                pid: launch.pid,
                status: launch.outcome.status,
                timed_out: launch.outcome.timed_out,
                cgroup: launch.cgroup,
                started_at,
                finished_at: Utc::now(),
            }),
            Err(err) => {
                self.process.fail(self.process.status());
                self.observer.on_event(&LifecycleEvent::Failed {
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn launch(&mut self) -> Result<Launch> {
        self.spec.validate()?;
        let plan = ChildPlan::from_spec(&self.spec, self.namespaces)?;

        self.process.advance(LifecycleState::Isolating)?;
        self.backend.isolate(self.namespaces)?;
        self.observer.on_event(&LifecycleEvent::Isolated {
            namespaces: self.namespaces,
        });

        let (parent, child) = Handshake::new()?.split();
        // SAFETY: the child only runs `child_main`, which performs syscalls
        // through the backend and leaves via `execvp` or `_exit`.
        match unsafe { fork() }.map_err(|e| McrError::Fork { source: e.into() })? {
            ForkResult::Child => {
                drop(parent);
                process::child_main(self.backend.as_ref(), &plan, child)
            }
            ForkResult::Parent { child: pid } => {
                drop(child);
                #[allow(clippy::cast_sign_loss)]
                let pid = pid.as_raw() as u32;
                self.supervise(pid, parent)
            }
        }
    }

    fn supervise(&mut self, pid: u32, mut barrier: ParentEnd) -> Result<Launch> {
        self.process.set_pid(pid);
        self.observer.on_event(&LifecycleEvent::Forked { pid });

        let ready = match barrier.wait_ready() {
            Ok(ready) => ready,
            Err(err) => return Err(self.terminate(pid, barrier, None, err)),
        };
        if !ready {
            let status = process::wait_blocking(pid)?;
            self.process.fail(Some(status));
            return Err(self.child_failure(status));
        }
        self.process.advance(LifecycleState::RootConfined)?;
        self.observer.on_event(&LifecycleEvent::Confined { pid });
        self.process.advance(LifecycleState::AwaitingRelease)?;

        let mut cgroup = None;
        if let Err(err) = self.limit(pid, &mut cgroup) {
            return Err(self.terminate(pid, barrier, cgroup, err));
        }

        match barrier.release() {
            Ok(true) => {}
            Ok(false) => {
                let status = process::wait_blocking(pid)?;
                self.remove_cgroup(cgroup);
                self.process.fail(Some(status));
                return Err(self.child_failure(status));
            }
            Err(err) => {
                let _ = kill_logged(pid);
                let status = process::wait_blocking(pid).ok();
                self.remove_cgroup(cgroup);
                self.process.fail(status);
                return Err(err);
            }
        }
        self.process.advance(LifecycleState::Executing)?;
        self.observer.on_event(&LifecycleEvent::Released { pid });

        let waited = process::wait_child(pid, self.deadline, self.heartbeat, self.observer.as_ref());
        let cgroup_name = cgroup.as_ref().map(|c| c.name().to_string());
        self.remove_cgroup(cgroup);
        let outcome = waited?;

        if outcome.status == ExitStatus::Exited(ChildExit::ExecFailed.code()) {
            self.process.fail(Some(outcome.status));
            return Err(ChildExit::ExecFailed.into_error(&self.spec));
        }
        self.process.exit(outcome.status)?;
        self.observer.on_event(&LifecycleEvent::Exited {
            pid,
            status: outcome.status,
        });
        Ok(Launch {
            pid,
            outcome,
            cgroup: cgroup_name,
        })
    }

    /// Creates the child's cgroup, applies the limits, then adds the child.
    ///
    /// The manager is stored in `slot` as soon as it exists so the caller
    /// can remove it after a partial failure.
    fn limit(&self, pid: u32, slot: &mut Option<CgroupManager>) -> Result<()> {
        if self.spec.limits.is_empty() {
            return Ok(());
        }
        let manager = slot.insert(CgroupManager::for_pid(&self.cgroup_root, pid)?);
        manager.apply_limits(&self.spec.limits)?;
        manager.add_process(pid)?;
        self.observer.on_event(&LifecycleEvent::Limited {
            pid,
            cgroup: manager.name().to_string(),
            applied: manager.applied().to_vec(),
        });
        Ok(())
    }

    /// Kills an unreleased child, reaps it, removes its cgroup and hands
    /// back `err`.
    fn terminate(
        &mut self,
        pid: u32,
        barrier: ParentEnd,
        cgroup: Option<CgroupManager>,
        err: McrError,
    ) -> McrError {
        self.observer.on_event(&LifecycleEvent::Terminated {
            pid,
            reason: err.to_string(),
        });
        let _ = kill_logged(pid);
        barrier.abort();
        let status = match process::wait_blocking(pid) {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(pid, error = %e, "failed to reap terminated container");
                None
            }
        };
        self.remove_cgroup(cgroup);
        self.process.fail(status);
        err
    }

    fn remove_cgroup(&self, cgroup: Option<CgroupManager>) {
        let Some(cgroup) = cgroup else {
            return;
        };
        let path = cgroup.path().to_path_buf();
        if let Err(e) = cgroup.destroy() {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove cgroup");
        }
    }

    /// Turns the status of a child that died before exec into an error.
    fn child_failure(&self, status: ExitStatus) -> McrError {
        status
            .code()
            .and_then(ChildExit::from_code)
            .map_or_else(
                || McrError::Isolation {
                    message: format!("container child terminated before release ({status})"),
                    source: None,
                },
                |reason| reason.into_error(&self.spec),
            )
    }
}

fn kill_logged(pid: u32) -> Result<()> {
    process::kill_child(pid).inspect_err(|e| {
        tracing::warn!(pid, error = %e, "failed to kill container");
    })
}
