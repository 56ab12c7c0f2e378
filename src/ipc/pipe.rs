//! Cross-wired duplex pipes.
//!
//! [`PipeFds::pair`] builds two halves out of two OS pipes so that a write
//! on one half's write end is read from the other half's read end. One half
//! is registered with the reactor as a [`Pipe`]; the other is handed to a
//! child process as raw descriptors and must never be registered in the
//! parent (registration switches the shared file description to
//! non-blocking mode).

use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

use thiserror::Error;
use tokio::net::unix::pipe;

use crate::ipc::protocol::{Message, ProtocolError};

#[derive(Debug, Error)]
pub enum PipeError {
    #[error("error creating pipe: {0}")]
    Create(#[source] io::Error),
    #[error("error registering pipe: {0}")]
    Register(#[source] io::Error),
    #[error("error reading pipe: {0}")]
    Read(#[source] io::Error),
    #[error("error writing pipe: {0}")]
    Write(#[source] io::Error),
    #[error("error closing pipe reader: {0}")]
    CloseReader(#[source] io::Error),
    #[error("error closing pipe writer: {0}")]
    CloseWriter(#[source] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl PipeError {
    /// True when the peer closed its end (EOF on read, EPIPE on write).
    pub fn is_disconnect(&self) -> bool {
        match self {
            PipeError::Read(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            PipeError::Write(e) => e.kind() == io::ErrorKind::BrokenPipe,
            _ => false,
        }
    }
}

/// One half of a duplex pair as plain, unregistered descriptors.
#[derive(Debug)]
pub struct PipeFds {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

impl PipeFds {
    /// Create a cross-wired pair of halves.
    ///
    /// All four descriptors are close-on-exec; whoever passes a half to a
    /// child is responsible for placing it explicitly.
    pub fn pair() -> Result<(PipeFds, PipeFds), PipeError> {
        let (a_read, b_write) = os_pipe::pipe().map_err(PipeError::Create)?;
        let (b_read, a_write) = os_pipe::pipe().map_err(PipeError::Create)?;

        let a = PipeFds {
            read: a_read.into(),
            write: a_write.into(),
        };
        let b = PipeFds {
            read: b_read.into(),
            write: b_write.into(),
        };
        Ok((a, b))
    }

    pub fn raw(&self) -> (RawFd, RawFd) {
        (self.read.as_raw_fd(), self.write.as_raw_fd())
    }
}

/// A registered half of a duplex pair.
///
/// All I/O methods take `&self`, so one half can be shared between a writer
/// task and a reader task.
#[derive(Debug)]
pub struct Pipe {
    reader: pipe::Receiver,
    writer: pipe::Sender,
}

impl Pipe {
    /// Register a half with the current runtime.
    pub fn from_fds(fds: PipeFds) -> Result<Self, PipeError> {
        let reader = pipe::Receiver::from_owned_fd(fds.read).map_err(PipeError::Register)?;
        let writer = pipe::Sender::from_owned_fd(fds.write).map_err(PipeError::Register)?;
        Ok(Self { reader, writer })
    }

    /// Read exactly one byte. EOF is reported as `UnexpectedEof`.
    pub async fn read_byte(&self) -> Result<u8, PipeError> {
        let mut buf = [0u8; 1];
        loop {
            self.reader.readable().await.map_err(PipeError::Read)?;
            match self.reader.try_read(&mut buf) {
                Ok(0) => {
                    return Err(PipeError::Read(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "pipe closed by peer",
                    )))
                }
                Ok(_) => return Ok(buf[0]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(PipeError::Read(e)),
            }
        }
    }

    /// Write exactly one byte.
    pub async fn write_byte(&self, byte: u8) -> Result<(), PipeError> {
        loop {
            self.writer.writable().await.map_err(PipeError::Write)?;
            match self.writer.try_write(&[byte]) {
                Ok(0) => return Err(PipeError::Write(io::ErrorKind::WriteZero.into())),
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(PipeError::Write(e)),
            }
        }
    }

    pub async fn send(&self, message: Message) -> Result<(), PipeError> {
        self.write_byte(message.as_byte()).await
    }

    pub async fn recv(&self) -> Result<Message, PipeError> {
        let byte = self.read_byte().await?;
        Ok(Message::from_byte(byte)?)
    }

    /// Close both files. If both fail, the reader's failure is reported.
    pub fn close(self) -> Result<(), PipeError> {
        let read = self
            .reader
            .into_nonblocking_fd()
            .and_then(close_fd)
            .map_err(PipeError::CloseReader);
        let write = self
            .writer
            .into_nonblocking_fd()
            .and_then(close_fd)
            .map_err(PipeError::CloseWriter);
        read.and(write)
    }
}

fn close_fd(fd: OwnedFd) -> io::Result<()> {
    nix::unistd::close(fd.into_raw_fd()).map_err(io::Error::from)
}
