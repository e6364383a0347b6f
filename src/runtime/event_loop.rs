//! Iterative accept loop.
//!
//! One connection is served to completion before the next is accepted.
//! Sockets are non-blocking and every wait goes through a single `mio::Poll`
//! that also listens for the shutdown waker, which is how a blocking accept
//! or read gets "interrupted": the wait returns `ErrorKind::Interrupted`
//! once shutdown has been requested.
//!
//! Readiness is edge-triggered, so every operation is attempted first and
//! we only wait after it reports `WouldBlock`. Accept failures that leave the
//! pending connection in the backlog (e.g. `EMFILE`) are retried after a
//! bounded pause instead of immediately.

use crate::aggregate::Aggregator;
use crate::config::Config;
use crate::runtime::connection::{self, ConnState, DropReason, HandlerOptions, Outcome};
use crate::runtime::shutdown::Shutdown;
use crate::runtime::StartupError;
use crate::stream::StreamError;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

const LISTENER_TOKEN: Token = Token(0);
const CONNECTION_TOKEN: Token = Token(1);
const WAKER_TOKEN: Token = Token(2);

/// Delay before retrying an accept that failed for lack of resources.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

struct Reactor {
    poll: Poll,
    events: Events,
    shutdown: Shutdown,
}

impl Reactor {
    /// Block until `token` may have become ready.
    ///
    /// Returns `Interrupted` if shutdown has been requested. A shutdown
    /// wakeup itself returns `Ok` so the caller retries its operation once
    /// more and picks up anything that already arrived.
    fn wait(&mut self, token: Token) -> io::Result<()> {
        loop {
            if self.shutdown.is_requested() {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "shutdown requested",
                ));
            }

            match self.poll.poll(&mut self.events, None) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            if self
                .events
                .iter()
                .any(|event| event.token() == token || event.token() == WAKER_TOKEN)
            {
                return Ok(());
            }
        }
    }

    /// Sleep for up to `timeout`, returning early once shutdown is requested.
    fn pause(&mut self, timeout: Duration) -> io::Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline || self.shutdown.is_requested() {
                return Ok(());
            }

            match self.poll.poll(&mut self.events, Some(deadline - now)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

/// Whether an accept error came from the peer (the next pending connection
/// is unaffected) rather than from the server running out of resources.
fn is_peer_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}

/// Blocking `Read`/`Write` view of a non-blocking connection.
struct PolledStream<'a> {
    stream: &'a mut TcpStream,
    reactor: &'a mut Reactor,
}

impl Read for PolledStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.stream.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.reactor.wait(CONNECTION_TOKEN)?
                }
                Err(e)
                    if e.kind() == io::ErrorKind::Interrupted
                        && !self.reactor.shutdown.is_requested() => {}
                result => return result,
            }
        }
    }
}

impl Write for PolledStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.stream.write(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.reactor.wait(CONNECTION_TOKEN)?
                }
                Err(e)
                    if e.kind() == io::ErrorKind::Interrupted
                        && !self.reactor.shutdown.is_requested() => {}
                result => return result,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// A bound counting server.
pub struct Server {
    reactor: Reactor,
    listener: TcpListener,
    local_addr: SocketAddr,
    options: HandlerOptions,
    aggregator: Aggregator,
}

impl Server {
    /// Bind and listen according to `config`.
    pub fn bind(config: &Config) -> Result<Self, StartupError> {
        let listener = create_listener(config.listen, config.backlog)?;
        let local_addr = listener.local_addr().map_err(StartupError::Listen)?;
        let mut listener = TcpListener::from_std(listener);

        let poll = Poll::new().map_err(StartupError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(StartupError::Poll)?;
        let shutdown = Shutdown::new(poll.registry(), WAKER_TOKEN).map_err(StartupError::Poll)?;

        info!(
            addr = %local_addr,
            backlog = config.backlog,
            chunk_size = config.chunk_size,
            on_interrupt = ?config.on_interrupt,
            "Server listening"
        );

        Ok(Server {
            reactor: Reactor {
                poll,
                events: Events::with_capacity(16),
                shutdown,
            },
            listener,
            local_addr,
            options: HandlerOptions {
                chunk_size: config.chunk_size,
                on_interrupt: config.on_interrupt,
            },
            aggregator: Aggregator::new(),
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for requesting shutdown from another thread or a signal handler.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.reactor.shutdown.clone()
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Accept and serve connections until shutdown is requested.
    ///
    /// Only a failure of the poller itself is returned as an error; every
    /// per-connection failure is absorbed.
    pub fn run(&mut self) -> io::Result<()> {
        let mut accept_failures = 0u32;

        while !self.reactor.shutdown.is_requested() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    accept_failures = 0;
                    self.serve_connection(stream, peer);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    match self.reactor.wait(LISTENER_TOKEN) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => break,
                        Err(e) => return Err(e),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    accept_failures = accept_failures.saturating_add(1);
                    self.accept_failed(&e, accept_failures)?;
                }
            }
        }

        let dropped = self.aggregator.dropped();
        info!(
            served = self.aggregator.served(),
            truncated = self.aggregator.truncated(),
            dropped_by_client = dropped.client,
            dropped_by_shutdown = dropped.shutdown,
            "Shutdown requested, stopped accepting"
        );
        Ok(())
    }

    /// Recover from a failed accept. `consecutive` counts failures since the
    /// last successful accept.
    fn accept_failed(&mut self, e: &io::Error, consecutive: u32) -> io::Result<()> {
        if is_peer_accept_error(e) {
            debug!(error = %e, "Pending connection went away before accept");
            return Ok(());
        }

        if consecutive == 1 {
            info!(
                error = %e,
                backoff = ?ACCEPT_BACKOFF,
                "Failed to accept connection, backing off"
            );
        } else {
            trace!(error = %e, consecutive, "Accept still failing");
        }
        self.reactor.pause(ACCEPT_BACKOFF)
    }

    fn serve_connection(&mut self, mut stream: TcpStream, peer: SocketAddr) {
        debug!(peer = %peer, "Accepted connection");

        let registered = self.reactor.poll.registry().register(
            &mut stream,
            CONNECTION_TOKEN,
            Interest::READABLE | Interest::WRITABLE,
        );
        let outcome = match registered {
            Ok(()) => {
                let mut conn = PolledStream {
                    stream: &mut stream,
                    reactor: &mut self.reactor,
                };
                let outcome = connection::handle(&mut conn, &self.options);
                if let Err(e) = self.reactor.poll.registry().deregister(&mut stream) {
                    trace!(peer = %peer, error = %e, "Failed to deregister connection");
                }
                outcome
            }
            Err(e) => Outcome::Dropped(DropReason::new(ConnState::Accepted, StreamError::Io(e))),
        };
        drop(stream);

        match &outcome {
            Outcome::Served { tally, truncated } => {
                debug!(peer = %peer, count = tally.total, truncated, "Served client");
            }
            Outcome::Dropped(reason) if reason.is_shutdown() => {
                debug!(peer = %peer, reason = %reason, "Dropped client on shutdown");
            }
            Outcome::Dropped(reason) => {
                debug!(peer = %peer, reason = %reason, "Dropped client");
            }
        }

        self.aggregator.record(&outcome);
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR and a bounded
/// backlog.
fn create_listener(addr: SocketAddr, backlog: i32) -> Result<std::net::TcpListener, StartupError> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )
    .map_err(StartupError::Socket)?;

    socket
        .set_reuse_address(true)
        .map_err(StartupError::Socket)?;
    socket.set_nonblocking(true).map_err(StartupError::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|e| StartupError::Bind(addr, e))?;
    socket.listen(backlog).map_err(StartupError::Listen)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> Config {
        Config::with_listen("127.0.0.1:0".parse().unwrap())
    }

    #[test]
    fn test_bind_resolves_ephemeral_port() {
        let server = Server::bind(&loopback_config()).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.aggregator().served(), 0);
    }

    #[test]
    fn test_rebind_after_close() {
        let server = Server::bind(&loopback_config()).unwrap();
        let addr = server.local_addr();
        drop(server);

        let again = Server::bind(&Config::with_listen(addr)).unwrap();
        assert_eq!(again.local_addr(), addr);
    }

    #[test]
    fn test_bind_conflict_is_startup_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let err = Server::bind(&Config::with_listen(taken.local_addr().unwrap()));
        assert!(matches!(err, Err(StartupError::Bind(..))));
    }

    #[test]
    fn test_peer_accept_errors_are_not_resource_errors() {
        assert!(is_peer_accept_error(&io::Error::from(
            io::ErrorKind::ConnectionAborted
        )));
        assert!(is_peer_accept_error(&io::Error::from(
            io::ErrorKind::ConnectionReset
        )));
        // EMFILE
        assert!(!is_peer_accept_error(&io::Error::from_raw_os_error(24)));
    }

    #[test]
    fn test_resource_accept_error_backs_off() {
        let mut server = Server::bind(&loopback_config()).unwrap();
        let emfile = io::Error::from_raw_os_error(24);

        for consecutive in 1..=3 {
            let started = Instant::now();
            server.accept_failed(&emfile, consecutive).unwrap();
            assert!(started.elapsed() >= ACCEPT_BACKOFF);
        }
    }

    #[test]
    fn test_peer_accept_error_retries_immediately() {
        let mut server = Server::bind(&loopback_config()).unwrap();
        let aborted = io::Error::from(io::ErrorKind::ConnectionAborted);

        let started = Instant::now();
        server.accept_failed(&aborted, 1).unwrap();
        assert!(started.elapsed() < ACCEPT_BACKOFF);
    }

    #[test]
    fn test_backoff_ends_early_on_shutdown() {
        let mut server = Server::bind(&loopback_config()).unwrap();
        let shutdown = server.shutdown_handle();
        let waker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            shutdown.request();
        });

        let started = Instant::now();
        server.reactor.pause(Duration::from_secs(30)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        waker.join().unwrap();
    }

    #[test]
    fn test_run_returns_once_shutdown_requested() {
        let mut server = Server::bind(&loopback_config()).unwrap();
        server.shutdown_handle().request();
        server.run().unwrap();
        assert_eq!(server.aggregator().served(), 0);
    }
}
