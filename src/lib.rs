//! pcc: printable character counting over TCP.
//!
//! A client sends a 4-byte big-endian length followed by that many bytes.
//! The server answers with a 4-byte big-endian count of the printable ASCII
//! bytes (32..=126) in the payload, then closes the connection. Across its
//! lifetime the server accumulates a per-character histogram and prints it
//! when asked to shut down.
//!
//! Connections are handled one at a time on a single thread. SIGINT/SIGTERM
//! stop the accept loop; a request whose payload is still arriving is
//! answered with the count of what already arrived (see
//! `config::InterruptPolicy`).

pub mod aggregate;
pub mod client;
pub mod codec;
pub mod config;
pub mod counter;
pub mod runtime;
pub mod stream;
