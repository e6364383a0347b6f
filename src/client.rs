//! Client side of the counting protocol.
//!
//! Opens one connection per request, sends the framed payload and waits for
//! the 4-byte count.

use crate::codec::{self, FRAME_HEADER_LEN};
use crate::stream::{self, StreamError};
use std::fmt;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};
use tracing::debug;

/// Payload bytes sent per write when streaming from a reader.
const SEND_CHUNK_SIZE: usize = 8 * 1024;

/// Client errors.
#[derive(Debug)]
pub enum ClientError {
    Connect(io::Error),
    /// The payload length does not fit the 32-bit length prefix.
    PayloadTooLarge(u64),
    /// Reading the payload source failed.
    Source(io::Error),
    Send(StreamError),
    Receive(StreamError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connect(e) => write!(f, "connect failed: {e}"),
            ClientError::PayloadTooLarge(len) => {
                write!(f, "payload of {len} bytes exceeds the {} byte limit", u32::MAX)
            }
            ClientError::Source(e) => write!(f, "reading payload failed: {e}"),
            ClientError::Send(e) => write!(f, "sending request failed: {e}"),
            ClientError::Receive(e) => write!(f, "receiving count failed: {e}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Connect(e) | ClientError::Source(e) => Some(e),
            ClientError::Send(e) | ClientError::Receive(e) => Some(e),
            ClientError::PayloadTooLarge(_) => None,
        }
    }
}

/// Send an in-memory payload and return the server's printable count.
pub fn submit(addr: SocketAddr, payload: &[u8]) -> Result<u32, ClientError> {
    let frame = codec::encode_request(payload)
        .ok_or(ClientError::PayloadTooLarge(payload.len() as u64))?;

    let mut conn = TcpStream::connect(addr).map_err(ClientError::Connect)?;
    debug!(server = %addr, len = payload.len(), "Sending request");
    stream::write_exact(&mut conn, &frame).map_err(ClientError::Send)?;

    receive_count(&mut conn)
}

/// Stream exactly `len` bytes from `source` and return the server's
/// printable count.
pub fn submit_reader<R: Read + ?Sized>(
    addr: SocketAddr,
    source: &mut R,
    len: u64,
) -> Result<u32, ClientError> {
    let declared = u32::try_from(len).map_err(|_| ClientError::PayloadTooLarge(len))?;

    let mut conn = TcpStream::connect(addr).map_err(ClientError::Connect)?;
    debug!(server = %addr, len, "Streaming request");
    stream::write_exact(&mut conn, &codec::encode_u32(declared)).map_err(ClientError::Send)?;

    let mut buf = vec![0u8; SEND_CHUNK_SIZE.min(declared as usize)];
    let mut remaining = declared as usize;
    while remaining > 0 {
        let want = remaining.min(buf.len());
        source
            .read_exact(&mut buf[..want])
            .map_err(ClientError::Source)?;
        stream::write_exact(&mut conn, &buf[..want]).map_err(ClientError::Send)?;
        remaining -= want;
    }

    receive_count(&mut conn)
}

fn receive_count(conn: &mut TcpStream) -> Result<u32, ClientError> {
    let mut reply = [0u8; FRAME_HEADER_LEN];
    stream::read_exact(conn, &mut reply).map_err(ClientError::Receive)?;
    Ok(codec::decode_u32(reply))
}
