//! Shutdown request flag.
//!
//! The flag is set once, from the signal handler thread or from a test,
//! and never cleared. Setting it also wakes the event loop's poller so a
//! wait in progress returns and observes the flag.

use mio::{Registry, Token, Waker};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle to the server's shutdown flag.
#[derive(Clone, Debug)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl Shutdown {
    /// Create a shutdown flag whose wakeups arrive on `registry` as `token`.
    pub(crate) fn new(registry: &Registry, token: Token) -> io::Result<Self> {
        Ok(Self {
            requested: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(Waker::new(registry, token)?),
        })
    }

    /// Ask the server to stop. Only the first call has any effect.
    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            // A failed wake only delays shutdown until the next event.
            let _ = self.waker.wake();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Route SIGINT/SIGTERM to `shutdown`.
///
/// The handler runs on a dedicated thread and does nothing but set the flag.
/// Can only be installed once per process.
pub fn install_signal_handler(shutdown: Shutdown) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || shutdown.request())
}
