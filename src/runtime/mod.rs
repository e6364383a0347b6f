//! Single-threaded server runtime.
//!
//! - `event_loop`: listener setup and the iterative accept loop
//! - `connection`: per-connection state machine
//! - `shutdown`: shutdown flag shared with the signal handler

pub mod connection;
pub mod event_loop;
pub mod shutdown;

pub use event_loop::Server;
pub use shutdown::{install_signal_handler, Shutdown};

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Failures that prevent the server from starting.
#[derive(Debug)]
pub enum StartupError {
    Socket(io::Error),
    Bind(SocketAddr, io::Error),
    Listen(io::Error),
    Poll(io::Error),
    Signal(ctrlc::Error),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Socket(e) => write!(f, "socket creation failed: {e}"),
            StartupError::Bind(addr, e) => write!(f, "bind to {addr} failed: {e}"),
            StartupError::Listen(e) => write!(f, "listen failed: {e}"),
            StartupError::Poll(e) => write!(f, "poller setup failed: {e}"),
            StartupError::Signal(e) => write!(f, "signal handler registration failed: {e}"),
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartupError::Socket(e)
            | StartupError::Bind(_, e)
            | StartupError::Listen(e)
            | StartupError::Poll(e) => Some(e),
            StartupError::Signal(e) => Some(e),
        }
    }
}

impl From<ctrlc::Error> for StartupError {
    fn from(e: ctrlc::Error) -> Self {
        StartupError::Signal(e)
    }
}
