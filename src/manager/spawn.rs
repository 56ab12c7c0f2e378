//! Worker process launch.
//!
//! A worker is the current executable started again with the same
//! arguments, the same environment plus [`WORKER_ENV`], and three extra
//! descriptors at the slots in [`INHERITED_FDS`].

use std::ffi::OsString;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::process::Stdio;

use nix::fcntl::{fcntl, FcntlArg};
use tokio::process::{Child, Command};

use crate::ipc::PipeFds;
use crate::lifecycle::WORKER_ENV;
use crate::worker::inherit::INHERITED_FDS;

/// Lowest descriptor number that is never one of the inherited slots.
const FIRST_FREE_FD: RawFd = INHERITED_FDS[INHERITED_FDS.len() - 1] + 1;

/// How to start a worker process.
#[derive(Debug, Clone)]
pub struct WorkerSpawner {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerSpawner {
    /// Re-run the current executable with the current arguments.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: std::env::args_os().skip(1).collect(),
        })
    }

    pub fn new<I, A>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Start one worker holding `listener` and the worker half of a pipe.
    ///
    /// Stdout and stderr are shared with the manager; stdin is closed.
    pub fn spawn(&self, listener: BorrowedFd<'_>, pipe: &PipeFds) -> io::Result<Child> {
        // Copies above the slot range, so placing one never overwrites the
        // source of another.
        let copies = [
            dup_above_slots(listener)?,
            dup_above_slots(pipe.read.as_fd())?,
            dup_above_slots(pipe.write.as_fd())?,
        ];
        let sources = [
            copies[0].as_raw_fd(),
            copies[1].as_raw_fd(),
            copies[2].as_raw_fd(),
        ];

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(false);

        // SAFETY: the hook only calls dup2, which is async-signal-safe, and
        // touches no memory besides the copied array of raw descriptors.
        unsafe {
            cmd.pre_exec(move || place_inherited(&sources));
        }

        // The parent's copies close when `copies` drops; the child keeps
        // its own.
        let child = cmd.spawn()?;
        drop(copies);
        Ok(child)
    }
}

fn dup_above_slots(fd: BorrowedFd<'_>) -> io::Result<OwnedFd> {
    let raw = fcntl(fd.as_raw_fd(), FcntlArg::F_DUPFD_CLOEXEC(FIRST_FREE_FD))?;
    // SAFETY: F_DUPFD_CLOEXEC returned a fresh descriptor that nobody else owns.
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

/// Runs in the forked child before exec. dup2 onto a different number
/// clears close-on-exec on the target, which is what lets it survive exec.
fn place_inherited(sources: &[RawFd; 3]) -> io::Result<()> {
    for (&source, target) in sources.iter().zip(INHERITED_FDS) {
        if unsafe { libc::dup2(source, target) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_fd_is_past_slots() {
        assert_eq!(FIRST_FREE_FD, 6);
    }

    #[test]
    fn current_exe_uses_own_args() {
        let spawner = WorkerSpawner::current_exe().unwrap();
        assert_eq!(spawner.program(), std::env::current_exe().unwrap());
        assert_eq!(
            spawner.args,
            std::env::args_os().skip(1).collect::<Vec<_>>()
        );
    }

    #[test]
    fn duplicates_land_above_slots() {
        let (a, _b) = PipeFds::pair().unwrap();
        let copy = dup_above_slots(a.read.as_fd()).unwrap();
        assert!(copy.as_raw_fd() >= FIRST_FREE_FD);
    }

    #[tokio::test]
    async fn child_sees_marker_and_slots() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let (_manager, worker) = PipeFds::pair().unwrap();

        let script = format!("[ \"${WORKER_ENV}\" = 1 ] && [ -S /dev/fd/3 ] && printf x >&5");
        let spawner = WorkerSpawner::new("/bin/sh", ["-c", script.as_str()]);
        let mut child = spawner.spawn(listener.as_fd(), &worker).unwrap();
        let status = child.wait().await.unwrap();
        assert!(status.success(), "child reported {status}");
    }
}
