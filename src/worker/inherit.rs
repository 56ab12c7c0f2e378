//! Resources inherited from the manager at fixed descriptor slots.

use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::stat::{fstat, SFlag};
use thiserror::Error;

use crate::ipc::{Pipe, PipeError, PipeFds};
use crate::net::{Listener, ListenerError};

/// Shared listening socket.
pub const LISTENER_FD: RawFd = 3;
/// Worker's read end of its pipe (manager → worker).
pub const PIPE_READ_FD: RawFd = 4;
/// Worker's write end of its pipe (worker → manager).
pub const PIPE_WRITE_FD: RawFd = 5;

/// Slots in the order the manager places them.
pub const INHERITED_FDS: [RawFd; 3] = [LISTENER_FD, PIPE_READ_FD, PIPE_WRITE_FD];

static TAKEN: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum InheritError {
    #[error("inherited resources were already taken")]
    AlreadyTaken,
    #[error("inherited fd {fd} is not usable: {source}")]
    BadFd {
        fd: RawFd,
        #[source]
        source: io::Error,
    },
    #[error("inherited fd {0} is not a socket")]
    NotSocket(RawFd),
    #[error("error creating listener from inherited fd: {0}")]
    Listener(#[source] ListenerError),
    #[error("error creating pipe from inherited fds: {0}")]
    Pipe(#[source] PipeError),
}

/// Everything a worker receives from its manager.
#[derive(Debug)]
pub struct Inherited {
    pub listener: Listener,
    pub pipe: Pipe,
}

/// Take ownership of fds 3, 4 and 5 and rebuild the listener and pipe.
///
/// Must run inside a tokio runtime. The descriptors are marked
/// close-on-exec so they do not leak into anything the worker spawns.
///
/// # Safety
///
/// The process must have been started by the manager (so the three slots
/// hold the listener and pipe ends), and nothing else in the process may
/// own those descriptors. Later calls fail with `AlreadyTaken`.
pub unsafe fn take_inherited() -> Result<Inherited, InheritError> {
    if TAKEN.swap(true, Ordering::SeqCst) {
        return Err(InheritError::AlreadyTaken);
    }

    for fd in INHERITED_FDS {
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(|e| InheritError::BadFd {
            fd,
            source: e.into(),
        })?;
    }

    let stat = fstat(LISTENER_FD).map_err(|e| InheritError::BadFd {
        fd: LISTENER_FD,
        source: e.into(),
    })?;
    if SFlag::from_bits_truncate(stat.st_mode) & SFlag::S_IFMT != SFlag::S_IFSOCK {
        return Err(InheritError::NotSocket(LISTENER_FD));
    }

    // SAFETY: the caller guarantees these slots hold the descriptors placed
    // by the manager and that no other owner exists; TAKEN makes this the
    // only place they are adopted.
    let (listener_fd, read, write) = unsafe {
        (
            OwnedFd::from_raw_fd(LISTENER_FD),
            OwnedFd::from_raw_fd(PIPE_READ_FD),
            OwnedFd::from_raw_fd(PIPE_WRITE_FD),
        )
    };

    let listener = Listener::from_std(std::net::TcpListener::from(listener_fd))
        .map_err(InheritError::Listener)?;
    let pipe = Pipe::from_fds(PipeFds { read, write }).map_err(InheritError::Pipe)?;

    Ok(Inherited { listener, pipe })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_stdio() {
        assert_eq!(INHERITED_FDS, [3, 4, 5]);
    }

    #[test]
    fn error_names_descriptor() {
        let err = InheritError::BadFd {
            fd: PIPE_WRITE_FD,
            source: io::Error::from_raw_os_error(libc::EBADF),
        };
        assert!(err.to_string().starts_with("inherited fd 5 is not usable"));
    }
}
