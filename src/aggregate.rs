//! Process-wide statistics.
//!
//! The aggregator owns the global histogram and the served-client counter.
//! Both change together, in `record`, and only for served connections, so
//! the final report never reflects a half-applied request.

use crate::counter::Histogram;
use crate::runtime::connection::Outcome;
use std::io::{self, Write};

/// Connections that were dropped, split by cause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropStats {
    /// The peer misbehaved or the transport failed.
    pub client: u32,
    /// A shutdown request interrupted the connection.
    pub shutdown: u32,
}

/// Aggregated statistics for the lifetime of a server.
#[derive(Debug, Default)]
pub struct Aggregator {
    histogram: Histogram,
    served: u32,
    truncated: u32,
    dropped: DropStats,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the outcome of one finished connection into the totals.
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Served { tally, truncated } => {
                self.histogram.merge(&tally.histogram);
                self.served = self.served.saturating_add(1);
                if *truncated {
                    self.truncated = self.truncated.saturating_add(1);
                }
            }
            Outcome::Dropped(reason) if reason.is_shutdown() => {
                self.dropped.shutdown = self.dropped.shutdown.saturating_add(1);
            }
            Outcome::Dropped(_) => {
                self.dropped.client = self.dropped.client.saturating_add(1);
            }
        }
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Number of clients whose result was delivered.
    pub fn served(&self) -> u32 {
        self.served
    }

    /// Served clients whose payload was cut short by shutdown.
    pub fn truncated(&self) -> u32 {
        self.truncated
    }

    pub fn dropped(&self) -> DropStats {
        self.dropped
    }

    /// Write the final report: one line per character seen, ascending by
    /// code, then the served-client line.
    pub fn write_report<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        for (c, n) in self.histogram.iter_nonzero() {
            writeln!(out, "char '{c}' : {n} times")?;
        }
        writeln!(out, "Served {} client(s) successfully", self.served)?;
        out.flush()
    }

    /// The report as a string.
    pub fn report(&self) -> String {
        let mut out = Vec::new();
        // Writing to a Vec cannot fail.
        let _ = self.write_report(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }
}
