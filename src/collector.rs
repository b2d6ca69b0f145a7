//! SSE collector
//!
//! Reads `data:` lines from the board, decodes each into a `SensorEvent` and
//! appends it to the store. Transport failures are never fatal: the loop
//! waits `retry_delay` and reconnects until shutdown is requested.

use chrono::Local;
use colored::*;
use eyre::Result;
use std::io::BufRead;
use std::time::Duration;

use crate::reading::{SensorEvent, format_receive_time};
use crate::shutdown::Shutdown;
use crate::sse::{self, EventSource};
use crate::store::Store;

/// Counters for one collector run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Successful connections
    pub connections: u64,
    /// Events written to the store
    pub stored: u64,
    /// Payloads that could not be decoded
    pub skipped: u64,
    /// Decoded events the store refused
    pub failed: u64,
}

/// What happened to a single payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Stored(i64),
    Skipped,
    Failed,
}

pub struct Collector<'a> {
    store: &'a Store,
    retry_delay: Duration,
    quiet: bool,
    stats: CollectStats,
}

impl<'a> Collector<'a> {
    pub fn new(store: &'a Store, retry_delay: Duration) -> Self {
        Self {
            store,
            retry_delay,
            quiet: false,
            stats: CollectStats::default(),
        }
    }

    /// Suppress the per-reading console lines
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Collect until shutdown is requested
    pub fn run(&mut self, source: &dyn EventSource, shutdown: &Shutdown) -> CollectStats {
        log::info!("Collecting from {}", source.describe());

        while !shutdown.is_requested() {
            self.say(format!("{} Initiating connection request...", "→".blue()));

            let failure = match source.connect() {
                Ok(reader) => {
                    self.stats.connections += 1;
                    self.say(format!(
                        "{} Connection successful! Waiting for sensor data...",
                        "✓".green()
                    ));
                    match self.consume(reader, shutdown) {
                        Ok(()) if shutdown.is_requested() => break,
                        Ok(()) => eyre::eyre!("Stream closed by the device"),
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            if shutdown.is_requested() {
                break;
            }

            log::warn!("Connection lost: {:#}", failure);
            self.say(format!("{} Connection lost: {:#}", "⚠".yellow(), failure));
            self.say(format!(
                "{} Reconnecting in {} seconds...",
                "→".blue(),
                self.retry_delay.as_secs_f32()
            ));
            if !shutdown.sleep(self.retry_delay) {
                break;
            }
        }

        log::info!("Collector stopped: {:?}", self.stats);
        self.stats
    }

    /// Read one connection until it ends.
    ///
    /// `Ok` means the stream reached EOF or shutdown was requested; `Err` is
    /// a read failure.
    fn consume(&mut self, reader: Box<dyn BufRead>, shutdown: &Shutdown) -> Result<()> {
        for line in reader.lines() {
            let line = line?;
            if let Some(payload) = sse::data_payload(&line)
                && let Outcome::Stored(id) = self.handle_payload(payload)
            {
                log::debug!("Stored reading {}", id);
            }
            if shutdown.is_requested() {
                break;
            }
        }
        Ok(())
    }

    fn handle_payload(&mut self, payload: &str) -> Outcome {
        let event = match SensorEvent::from_json(payload) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Data processing error: {:#} (payload: {})", e, payload);
                self.say(format!("{} Data processing error: {:#}", "✗".red(), e));
                self.stats.skipped += 1;
                return Outcome::Skipped;
            }
        };

        self.say(format!("  {}", event.summary()));

        let receive_time = format_receive_time(Local::now());
        match self.store.insert(&event, &receive_time) {
            Ok(id) => {
                self.stats.stored += 1;
                Outcome::Stored(id)
            }
            Err(e) => {
                log::error!("Failed to write to database: {}", e);
                self.say(format!("{} Failed to write to database: {}", "✗".red(), e));
                self.stats.failed += 1;
                Outcome::Failed
            }
        }
    }

    fn say(&self, message: String) {
        if !self.quiet {
            println!("{}", message);
        }
    }
}
