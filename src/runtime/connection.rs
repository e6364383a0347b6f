//! Connection state machine.
//!
//! A connection carries exactly one request:
//!
//! ```text
//! Accepted -> LengthRead -> PayloadRead -> ResultSent -> Closed
//!     \            \             \
//!      +------------+-------------+---> Closed (dropped)
//! ```
//!
//! Nothing here touches process-wide state. The handler only produces an
//! `Outcome`; the event loop closes the socket and then hands the outcome
//! to the aggregator, which ignores everything but `Outcome::Served`.

use crate::codec::{self, FRAME_HEADER_LEN};
use crate::config::InterruptPolicy;
use crate::counter::Tally;
use crate::stream::{self, StreamError};
use std::fmt;
use std::io::{Read, Write};
use tracing::{debug, trace};

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Accepted, waiting for the 4-byte length prefix.
    Accepted,
    /// Length prefix decoded, consuming the payload.
    LengthRead {
        /// Declared payload length.
        expected: u32,
    },
    /// Payload consumed and counted, sending the result.
    PayloadRead,
    /// Result delivered.
    ResultSent,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnState::Accepted => write!(f, "reading length"),
            ConnState::LengthRead { expected } => write!(f, "reading {expected}-byte payload"),
            ConnState::PayloadRead => write!(f, "sending result"),
            ConnState::ResultSent => write!(f, "done"),
        }
    }
}

/// Knobs for the handler, resolved from configuration.
#[derive(Debug, Clone, Copy)]
pub struct HandlerOptions {
    /// Largest single payload read.
    pub chunk_size: usize,
    /// What to do when shutdown interrupts a payload read.
    pub on_interrupt: InterruptPolicy,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            chunk_size: 8192,
            on_interrupt: InterruptPolicy::Drain,
        }
    }
}

/// Why a connection was dropped without being served.
#[derive(Debug)]
pub struct DropReason {
    /// State the connection was in when it failed.
    pub state: ConnState,
    pub error: StreamError,
}

impl DropReason {
    pub(crate) fn new(state: ConnState, error: StreamError) -> Self {
        Self { state, error }
    }

    /// Whether the drop was caused by a shutdown request rather than by
    /// the peer or the transport.
    pub fn is_shutdown(&self) -> bool {
        self.error.is_interrupted()
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} while {}", self.error, self.state)
    }
}

/// Final result of handling one connection.
#[derive(Debug)]
pub enum Outcome {
    /// The count was delivered to the client.
    Served {
        tally: Tally,
        /// The payload was cut short by shutdown and counted as-is.
        truncated: bool,
    },
    /// The connection left no trace in the statistics.
    Dropped(DropReason),
}

impl Outcome {
    pub fn is_served(&self) -> bool {
        matches!(self, Outcome::Served { .. })
    }
}

/// Drive one connection from `Accepted` to `ResultSent`.
///
/// The stream is borrowed, not consumed: closing it is the caller's job on
/// every path.
pub fn handle<S: Read + Write + ?Sized>(stream: &mut S, options: &HandlerOptions) -> Outcome {
    match serve(stream, options) {
        Ok((tally, truncated)) => Outcome::Served { tally, truncated },
        Err(reason) => Outcome::Dropped(reason),
    }
}

fn serve<S: Read + Write + ?Sized>(
    stream: &mut S,
    options: &HandlerOptions,
) -> Result<(Tally, bool), DropReason> {
    let mut state = ConnState::Accepted;

    let mut header = [0u8; FRAME_HEADER_LEN];
    stream::read_exact(stream, &mut header).map_err(|e| DropReason::new(state, e))?;
    let expected = codec::decode_u32(header);
    state = ConnState::LengthRead { expected };
    trace!(expected, "Length prefix received");

    let (tally, truncated) = read_payload(stream, expected, options)
        .map_err(|e| DropReason::new(state, e))?;
    state = ConnState::PayloadRead;

    stream::write_exact(stream, &codec::encode_u32(tally.total))
        .map_err(|e| DropReason::new(state, e))?;
    state = ConnState::ResultSent;
    trace!(%state, count = tally.total, "Result sent");

    Ok((tally, truncated))
}

/// Consume `expected` payload bytes in bounded chunks, counting as we go.
fn read_payload<S: Read + ?Sized>(
    stream: &mut S,
    expected: u32,
    options: &HandlerOptions,
) -> Result<(Tally, bool), StreamError> {
    let mut tally = Tally::default();
    let mut remaining = expected as usize;
    let mut chunk = vec![0u8; remaining.min(options.chunk_size.max(1))];

    while remaining > 0 {
        let want = remaining.min(chunk.len());
        match stream::read_exact(stream, &mut chunk[..want]) {
            Ok(()) => {
                tally.absorb(&chunk[..want]);
                remaining -= want;
            }
            Err(StreamError::Interrupted { received })
                if options.on_interrupt == InterruptPolicy::Drain =>
            {
                tally.absorb(&chunk[..received]);
                debug!(
                    expected,
                    missing = remaining - received,
                    "Shutdown mid-payload, counting what arrived"
                );
                return Ok((tally, true));
            }
            Err(e) => return Err(e),
        }
    }

    Ok((tally, false))
}
