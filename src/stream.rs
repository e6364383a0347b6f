//! Exact-length reads and writes over a byte stream.
//!
//! Sockets deliver data in arbitrary pieces. `read_exact` and `write_exact`
//! loop over partial transfers until the whole buffer is done, and classify
//! what went wrong when it isn't.
//!
//! Unlike `std::io::Read::read_exact`, an `ErrorKind::Interrupted` from the
//! underlying stream is not retried. The runtime only reports `Interrupted`
//! once shutdown has been requested, so it is surfaced to the caller, which
//! decides based on the protocol phase whether to keep what it has.

use std::fmt;
use std::io::{self, Read, Write};

/// Why an exact read or write stopped early.
#[derive(Debug)]
pub enum StreamError {
    /// The peer closed the stream (zero-length transfer).
    PeerClosed {
        /// Bytes transferred by this call before the close.
        received: usize,
    },
    /// A transfer was aborted by a shutdown request.
    Interrupted {
        /// Bytes transferred by this call before the interruption.
        received: usize,
    },
    /// Any other transport fault (reset, broken pipe, timeout).
    Io(io::Error),
}

impl StreamError {
    /// Bytes completed before the failure, where known.
    pub fn received(&self) -> usize {
        match self {
            StreamError::PeerClosed { received } | StreamError::Interrupted { received } => {
                *received
            }
            StreamError::Io(_) => 0,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, StreamError::Interrupted { .. })
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::PeerClosed { received } => {
                write!(f, "peer closed the connection after {received} bytes")
            }
            StreamError::Interrupted { received } => {
                write!(f, "interrupted by shutdown after {received} bytes")
            }
            StreamError::Io(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Fill `buf` completely from `stream`.
pub fn read_exact<R: Read + ?Sized>(stream: &mut R, buf: &mut [u8]) -> Result<(), StreamError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Err(StreamError::PeerClosed { received: filled }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                return Err(StreamError::Interrupted { received: filled })
            }
            Err(e) => return Err(StreamError::Io(e)),
        }
    }
    Ok(())
}

/// Write all of `buf` to `stream`.
pub fn write_exact<W: Write + ?Sized>(stream: &mut W, buf: &[u8]) -> Result<(), StreamError> {
    let mut written = 0;
    while written < buf.len() {
        match stream.write(&buf[written..]) {
            Ok(0) => return Err(StreamError::PeerClosed { received: written }),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                return Err(StreamError::Interrupted { received: written })
            }
            Err(e) => return Err(StreamError::Io(e)),
        }
    }
    Ok(())
}

/// In-memory stream that replays a fixed script of read results and
/// records writes, for exercising partial I/O deterministically.
#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};

    pub(crate) enum Step {
        /// Bytes to read. For writes, the call goes through normally.
        Data(Vec<u8>),
        Fail(io::ErrorKind),
        /// The call transfers nothing and returns `Ok(0)`.
        Closed,
    }

    #[derive(Default)]
    pub(crate) struct ScriptedStream {
        reads: VecDeque<Step>,
        writes: VecDeque<Step>,
        /// Largest number of bytes accepted per `write` call (0 = unlimited).
        pub write_limit: usize,
        pub written: Vec<u8>,
    }

    impl ScriptedStream {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn data(mut self, bytes: &[u8]) -> Self {
            self.reads.push_back(Step::Data(bytes.to_vec()));
            self
        }

        pub(crate) fn read_error(mut self, kind: io::ErrorKind) -> Self {
            self.reads.push_back(Step::Fail(kind));
            self
        }

        pub(crate) fn write_error(mut self, kind: io::ErrorKind) -> Self {
            self.writes.push_back(Step::Fail(kind));
            self
        }

        pub(crate) fn write_ok(mut self) -> Self {
            self.writes.push_back(Step::Data(Vec::new()));
            self
        }

        pub(crate) fn write_closed(mut self) -> Self {
            self.writes.push_back(Step::Closed);
            self
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                None | Some(Step::Closed) => Ok(0),
                Some(Step::Fail(kind)) => Err(io::Error::from(kind)),
                Some(Step::Data(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.reads.push_front(Step::Data(bytes.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.writes.pop_front() {
                Some(Step::Fail(kind)) => return Err(io::Error::from(kind)),
                Some(Step::Closed) => return Ok(0),
                Some(Step::Data(_)) | None => {}
            }
            let n = if self.write_limit == 0 {
                buf.len()
            } else {
                buf.len().min(self.write_limit)
            };
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
