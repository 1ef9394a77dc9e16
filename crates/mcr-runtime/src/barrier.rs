//! Parent/child handshake over a pair of pipes.
//!
//! The child writes one byte on the ready pipe once it is confined, then
//! blocks reading the release pipe. The parent writes the release byte only
//! after resource limits are in force; if it drops its end instead, the
//! child reads EOF and gives up without exec'ing.
//!
//! Both pipes are `O_CLOEXEC`, so the target command never inherits them.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};

use mcr_common::error::{McrError, Result};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;

const READY_BYTE: u8 = b'R';
const RELEASE_BYTE: u8 = b'G';

/// Both pipes, before the fork splits them between the two processes.
#[derive(Debug)]
pub struct Handshake {
    ready_rx: File,
    ready_tx: File,
    release_rx: File,
    release_tx: File,
}

impl Handshake {
    /// Creates the ready and release pipes.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::Io`] if `pipe2(2)` fails.
    pub fn new() -> Result<Self> {
        let (ready_rx, ready_tx) = create_pipe()?;
        let (release_rx, release_tx) = create_pipe()?;
        Ok(Self {
            ready_rx,
            ready_tx,
            release_rx,
            release_tx,
        })
    }

    /// Splits into the supervisor end and the container end.
    ///
    /// After `fork(2)` each process must drop the end it does not own,
    /// otherwise EOF never reaches the other side.
    #[must_use]
    pub fn split(self) -> (ParentEnd, ChildEnd) {
        let parent = ParentEnd {
            ready_rx: self.ready_rx,
            release_tx: self.release_tx,
        };
        let child = ChildEnd {
            ready_tx: self.ready_tx,
            release_rx: self.release_rx,
        };
        (parent, child)
    }
}

/// Supervisor end of the handshake.
#[derive(Debug)]
pub struct ParentEnd {
    ready_rx: File,
    release_tx: File,
}

impl ParentEnd {
    /// Blocks until the child reports it is confined.
    ///
    /// Returns `false` if the child closed the pipe first, meaning it exited
    /// before confinement completed.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::Io`] if reading the pipe fails.
    pub fn wait_ready(&mut self) -> Result<bool> {
        read_byte(&mut self.ready_rx).map_err(|e| barrier_error("ready", e))
    }

    /// Lets the child proceed to exec.
    ///
    /// Returns `false` if the child already exited (`EPIPE`).
    ///
    /// # Errors
    ///
    /// Returns [`McrError::Io`] for any other write failure.
    pub fn release(mut self) -> Result<bool> {
        match self.release_tx.write_all(&[RELEASE_BYTE]) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(false),
            Err(e) => Err(barrier_error("release", e)),
        }
    }

    /// Closes the release pipe without releasing the child.
    pub fn abort(self) {
        drop(self);
    }
}

/// Container end of the handshake.
///
/// Used between `fork(2)` and `execve(2)`, so it never logs and only
/// returns raw I/O errors.
#[derive(Debug)]
pub struct ChildEnd {
    ready_tx: File,
    release_rx: File,
}

impl ChildEnd {
    /// Tells the supervisor that confinement succeeded.
    ///
    /// # Errors
    ///
    /// Returns the write error, e.g. if the supervisor is gone.
    pub fn signal_ready(&mut self) -> std::io::Result<()> {
        self.ready_tx.write_all(&[READY_BYTE])
    }

    /// Blocks until released. Returns `false` on EOF.
    ///
    /// # Errors
    ///
    /// Returns the read error.
    pub fn wait_release(&mut self) -> std::io::Result<bool> {
        read_byte(&mut self.release_rx)
    }
}

/// Reads one byte, retrying on `EINTR`. Returns `false` on EOF.
fn read_byte(pipe: &mut File) -> std::io::Result<bool> {
    let mut buf = [0u8; 1];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) => return Ok(false),
            Ok(_) => return Ok(true),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

/// Creates a pipe (returns read end, write end).
fn create_pipe() -> Result<(File, File)> {
    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC).map_err(|e| McrError::Io {
        path: "pipe2".into(),
        source: e.into(),
    })?;
    Ok((File::from(read_end), File::from(write_end)))
}

fn barrier_error(side: &str, source: std::io::Error) -> McrError {
    McrError::Io {
        path: format!("{side} pipe").into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_and_release_bytes_cross_the_pipes() {
        let (mut parent, mut child) = Handshake::new().unwrap().split();
        child.signal_ready().unwrap();
        assert!(parent.wait_ready().unwrap());
        assert!(parent.release().unwrap());
        assert!(child.wait_release().unwrap());
    }

    #[test]
    fn dropped_child_end_reads_as_not_ready() {
        let (mut parent, child) = Handshake::new().unwrap().split();
        drop(child);
        assert!(!parent.wait_ready().unwrap());
    }

    #[test]
    fn aborted_parent_end_reads_as_not_released() {
        let (parent, mut child) = Handshake::new().unwrap().split();
        parent.abort();
        assert!(!child.wait_release().unwrap());
    }

    #[test]
    fn release_after_child_exit_reports_false() {
        let (parent, child) = Handshake::new().unwrap().split();
        drop(child);
        assert!(!parent.release().unwrap());
    }
}
