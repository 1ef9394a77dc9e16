//! Container child process: the code that runs between `fork(2)` and
//! `execvp(3)`, and the supervisor-side wait for its termination.

use std::ffi::CString;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use mcr_common::error::{McrError, Result};
use mcr_common::types::{ContainerSpec, ExitStatus};
use mcr_core::namespace::{Namespace, NamespaceSet};
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::backend::IsolationBackend;
use crate::barrier::ChildEnd;
use crate::events::{LifecycleEvent, LifecycleObserver};
use crate::exit_code::ChildExit;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Everything the child needs. The argv-to-`CString` conversion happens
/// before fork, so the child cannot fail on it.
#[derive(Debug, Clone)]
pub struct ChildPlan {
    program: CString,
    argv: Vec<CString>,
    hostname: Option<String>,
    rootfs: PathBuf,
}

impl ChildPlan {
    /// Builds the exec plan for `spec` launched into `namespaces`.
    ///
    /// The hostname is only kept when `namespaces` holds a UTS namespace;
    /// otherwise setting it would rename the host.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::InvalidSpec`] if the command is empty or an
    /// argument contains an interior NUL byte.
    pub fn from_spec(spec: &ContainerSpec, namespaces: NamespaceSet) -> Result<Self> {
        let argv = spec
            .command
            .iter()
            .map(|arg| {
                CString::new(arg.as_bytes())
                    .map_err(|_| McrError::invalid_spec(format!("argument contains NUL: {arg:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let program = argv
            .first()
            .cloned()
            .ok_or_else(|| McrError::invalid_spec("command is empty"))?;
        Ok(Self {
            program,
            argv,
            hostname: namespaces
                .contains(Namespace::Uts)
                .then(|| spec.hostname.clone()),
            rootfs: spec.rootfs.clone(),
        })
    }

    /// Executable as passed to `execvp(3)`.
    #[must_use]
    pub fn program(&self) -> &CString {
        &self.program
    }

    /// Full argument vector, including `argv[0]`.
    #[must_use]
    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    /// Hostname to set in the child, if any.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }
}

/// Runs the child side of the launch and never returns.
///
/// Sets the hostname, confines the root, reports ready, waits for release
/// and execs. Every failure ends the process with a [`ChildExit`] code.
///
/// `SIGPIPE` is restored to its default action before exec; the Rust
/// runtime ignores it in the supervisor and ignored dispositions survive
/// `execve(2)`.
pub fn child_main(backend: &dyn IsolationBackend, plan: &ChildPlan, mut end: ChildEnd) -> ! {
    if let Some(hostname) = plan.hostname() {
        if backend.set_hostname(hostname).is_err() {
            exit_child(ChildExit::HostnameFailed);
        }
    }
    if backend.confine(&plan.rootfs).is_err() {
        exit_child(ChildExit::RootfsFailed);
    }
    if end.signal_ready().is_err() {
        exit_child(ChildExit::ReleaseAborted);
    }
    match end.wait_release() {
        Ok(true) => {}
        Ok(false) | Err(_) => exit_child(ChildExit::ReleaseAborted),
    }
    // SAFETY: installs the default disposition, no handler code runs.
    let _ = unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) };
    // Only returns on failure.
    let _ = nix::unistd::execvp(&plan.program, &plan.argv);
    exit_child(ChildExit::ExecFailed)
}

fn exit_child(reason: ChildExit) -> ! {
    // SAFETY: `_exit` skips atexit handlers and stdio flushing, which belong
    // to the supervisor's copy of the address space.
    unsafe { libc::_exit(reason.code()) }
}

/// Sends `SIGKILL` to the child. A child that is already gone is not an
/// error.
///
/// # Errors
///
/// Returns [`McrError::Io`] if `kill(2)` fails for another reason.
pub fn kill_child(pid: u32) -> Result<()> {
    match signal::kill(to_pid(pid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(McrError::Io {
            path: format!("kill {pid}").into(),
            source: e.into(),
        }),
    }
}

/// Blocks until the child terminates and reaps it.
///
/// # Errors
///
/// Returns [`McrError::Io`] if `waitpid(2)` fails.
pub fn wait_blocking(pid: u32) -> Result<ExitStatus> {
    loop {
        match waitpid(to_pid(pid), None) {
            Ok(status) => {
                if let Some(exit) = terminal_status(status) {
                    return Ok(exit);
                }
            }
            Err(Errno::EINTR) => {}
            Err(e) => return Err(wait_error(pid, e)),
        }
    }
}

/// Outcome of [`wait_child`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Terminal status of the child.
    pub status: ExitStatus,
    /// Whether the deadline expired and the child was killed.
    pub timed_out: bool,
}

/// Waits for the released child, optionally bounded by `deadline`, emitting
/// a heartbeat event every `heartbeat`.
///
/// Without a deadline or heartbeat this is a plain blocking wait. Otherwise
/// the child is polled with `WNOHANG`; on expiry it is killed and reaped.
///
/// # Errors
///
/// Returns [`McrError::Io`] if `waitpid(2)` or `kill(2)` fails.
pub fn wait_child(
    pid: u32,
    deadline: Option<Duration>,
    heartbeat: Option<Duration>,
    observer: &dyn LifecycleObserver,
) -> Result<WaitOutcome> {
    if deadline.is_none() && heartbeat.is_none() {
        let status = wait_blocking(pid)?;
        return Ok(WaitOutcome {
            status,
            timed_out: false,
        });
    }

    let started = Instant::now();
    let mut next_beat = heartbeat.map(|h| started + h);
    loop {
        match waitpid(to_pid(pid), Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => {
                if let Some(exit) = terminal_status(status) {
                    return Ok(WaitOutcome {
                        status: exit,
                        timed_out: false,
                    });
                }
            }
            Err(Errno::EINTR) => {}
            Err(e) => return Err(wait_error(pid, e)),
        }

        let elapsed = started.elapsed();
        if let Some(limit) = deadline.filter(|d| elapsed >= *d) {
            observer.on_event(&LifecycleEvent::DeadlineExpired {
                pid,
                deadline: limit,
            });
            kill_child(pid)?;
            let status = wait_blocking(pid)?;
            return Ok(WaitOutcome {
                status,
                timed_out: true,
            });
        }
        if let (Some(at), Some(every)) = (next_beat, heartbeat) {
            if Instant::now() >= at {
                observer.on_event(&LifecycleEvent::Heartbeat { pid, elapsed });
                next_beat = Some(at + every);
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn terminal_status(status: WaitStatus) -> Option<ExitStatus> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitStatus::Exited(code)),
        WaitStatus::Signaled(_, sig, _) => Some(ExitStatus::Signaled(sig as i32)),
        _ => None,
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn to_pid(pid: u32) -> Pid {
    Pid::from_raw(pid as i32)
}

fn wait_error(pid: u32, errno: Errno) -> McrError {
    McrError::Io {
        path: format!("waitpid {pid}").into(),
        source: errno.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::process::Command;

    use crate::events::NullObserver;

    fn spawn(args: &[&str]) -> u32 {
        let child = Command::new(args[0]).args(&args[1..]).spawn().unwrap();
        child.id()
    }

    #[test]
    fn plan_keeps_argv_order() {
        let spec = ContainerSpec::new(vec!["/bin/echo".into(), "hello".into()], "/tmp/rootfs");
        let plan = ChildPlan::from_spec(&spec, NamespaceSet::container_default()).unwrap();
        assert_eq!(plan.program().to_str().unwrap(), "/bin/echo");
        let argv: Vec<&str> = plan.argv().iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(argv, ["/bin/echo", "hello"]);
    }

    #[test]
    fn plan_rejects_empty_command_and_nul() {
        let empty = ContainerSpec::new(Vec::new(), "/tmp/rootfs");
        assert!(matches!(
            ChildPlan::from_spec(&empty, NamespaceSet::container_default()),
            Err(McrError::InvalidSpec { .. })
        ));
        let nul = ContainerSpec::new(vec!["/bin/echo".into(), "a\0b".into()], "/tmp/rootfs");
        assert!(matches!(
            ChildPlan::from_spec(&nul, NamespaceSet::container_default()),
            Err(McrError::InvalidSpec { .. })
        ));
    }

    #[test]
    fn hostname_needs_uts_namespace() {
        let spec = ContainerSpec::new(vec!["/bin/true".into()], "/tmp/rootfs").hostname("box");
        let with_uts = ChildPlan::from_spec(&spec, NamespaceSet::container_default()).unwrap();
        assert_eq!(with_uts.hostname(), Some("box"));
        let without_uts = ChildPlan::from_spec(&spec, NamespaceSet::from(Namespace::Mount)).unwrap();
        assert_eq!(without_uts.hostname(), None);
        let none = ChildPlan::from_spec(&spec, NamespaceSet::empty()).unwrap();
        assert_eq!(none.hostname(), None);
    }

    #[test]
    fn blocking_wait_reports_exit_code() {
        let pid = spawn(&["/bin/sh", "-c", "exit 7"]);
        assert_eq!(wait_blocking(pid).unwrap(), ExitStatus::Exited(7));
    }

    #[test]
    fn deadline_kills_long_running_child() {
        let pid = spawn(&["/bin/sleep", "30"]);
        let outcome = wait_child(pid, Some(Duration::from_millis(100)), None, &NullObserver).unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.status, ExitStatus::Signaled(libc::SIGKILL));
    }

    #[test]
    fn polling_wait_returns_before_deadline() {
        let pid = spawn(&["/bin/true"]);
        let outcome = wait_child(pid, Some(Duration::from_secs(30)), None, &NullObserver).unwrap();
        assert!(!outcome.timed_out);
        assert_eq!(outcome.status, ExitStatus::Exited(0));
    }

    #[test]
    fn killing_a_reaped_child_is_not_an_error() {
        let pid = spawn(&["/bin/true"]);
        let _ = wait_blocking(pid).unwrap();
        assert!(kill_child(pid).is_ok());
    }
}
