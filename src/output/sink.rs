//! Output sink: standard output or an append-only file that survives rotation.
//!
//! A file sink checks that its path still exists before each write. When the
//! file has been removed or rotated away, the sink closes its handle and opens
//! the path again, so the next record lands in a fresh file. Every write is
//! flushed immediately for the benefit of `tail -f` style readers.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use super::Destination;

#[derive(Debug)]
pub enum SinkError {
    /// The file could not be opened for appending.
    Open { path: String, source: io::Error },
    /// Writing or flushing failed, including after one reopen.
    Write { target: String, source: io::Error },
    /// Standard output lost its reader; nothing written there will arrive.
    Closed,
}

impl SinkError {
    /// Whether writing to this sink can never succeed again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SinkError::Closed)
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Open { path, source } => {
                write!(f, "unable to open output file {path}: {source}")
            }
            SinkError::Write { target, source } => {
                write!(f, "failed to write to {target}: {source}")
            }
            SinkError::Closed => f.write_str("standard output was closed by its reader"),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Open { source, .. } | SinkError::Write { source, .. } => Some(source),
            SinkError::Closed => None,
        }
    }
}

enum Handle {
    Stdout(Box<dyn Write + Send>),
    File(File),
}

impl Handle {
    fn write_flushed(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Handle::Stdout(stream) => {
                stream.write_all(bytes)?;
                stream.flush()
            }
            Handle::File(file) => {
                file.write_all(bytes)?;
                file.flush()
            }
        }
    }
}

/// Destination of rendered samples, owned by the sampling loop.
pub struct OutputSink {
    destination: Destination,
    handle: Option<Handle>,
}

impl OutputSink {
    /// Open `destination`; files are created if needed and always appended to.
    pub fn open(destination: Destination) -> Result<Self, SinkError> {
        let handle = open_handle(&destination)?;
        Ok(Self {
            destination,
            handle: Some(handle),
        })
    }

    /// A standard-output sink writing into `stream` instead of fd 1.
    #[cfg(any(test, feature = "testing-support"))]
    pub fn with_stream(stream: impl Write + Send + 'static) -> Self {
        Self {
            destination: Destination::Stdout,
            handle: Some(Handle::Stdout(Box::new(stream))),
        }
    }

    /// A sink whose first open failed; the next write retries.
    pub fn unopened(destination: Destination) -> Self {
        Self {
            destination,
            handle: None,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn is_file_backed(&self) -> bool {
        self.destination.is_file()
    }

    /// Standard output is always healthy; a file sink is healthy while it is
    /// open and its path still exists.
    pub fn is_healthy(&self) -> bool {
        match &self.destination {
            Destination::Stdout => true,
            Destination::File(path) => self.handle.is_some() && path.exists(),
        }
    }

    /// Close and open the destination again.
    pub fn reopen(&mut self) -> Result<(), SinkError> {
        self.close();
        self.handle = Some(open_handle(&self.destination)?);
        Ok(())
    }

    /// Write and flush `bytes`.
    ///
    /// An unhealthy sink is reopened first. If writing to a file fails, the
    /// file is reopened and the same bytes are written once more. Standard
    /// output is never retried, and a broken pipe there is [`SinkError::Closed`].
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if !self.is_healthy() {
            self.reopen()?;
        }

        let first = match self.write_through(bytes) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if !self.is_file_backed() {
            if first.kind() == io::ErrorKind::BrokenPipe {
                return Err(SinkError::Closed);
            }
            return Err(self.write_error(first));
        }

        log_warning!("Write to {} failed: {first}, reopening", self.destination);
        self.reopen()?;
        self.write_through(bytes)
            .map_err(|source| self.write_error(source))
    }

    fn write_error(&self, source: io::Error) -> SinkError {
        SinkError::Write {
            target: self.destination.to_string(),
            source,
        }
    }

    /// Flush and release the underlying handle.
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            let _ = match &mut handle {
                Handle::Stdout(stdout) => stdout.flush(),
                Handle::File(file) => file.flush(),
            };
        }
    }

    fn write_through(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.handle.as_mut() {
            Some(handle) => handle.write_flushed(bytes),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "sink is closed")),
        }
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_handle(destination: &Destination) -> Result<Handle, SinkError> {
    match destination {
        Destination::Stdout => Ok(Handle::Stdout(Box::new(io::stdout()))),
        Destination::File(path) => open_append(path)
            .map(Handle::File)
            .map_err(|source| SinkError::Open {
                path: path.display().to_string(),
                source,
            }),
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
