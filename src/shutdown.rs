//! Ctrl+C handling for the blocking collector loop

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use colored::*;

/// How long a blocked network read gets to notice the interrupt
const GRACE_PERIOD: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared stop flag
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
    announced: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early if shutdown is requested.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Print the stop line, once across all clones
    pub fn announce_stopped(&self, quiet: bool) {
        if self.claim_announcement() && !quiet {
            println!();
            println!("{} Program stopped.", "■".yellow());
        }
    }

    fn claim_announcement(&self) -> bool {
        !self.announced.swap(true, Ordering::SeqCst)
    }

    /// Listen for Ctrl+C on a background thread.
    ///
    /// The first interrupt sets the flag. The collector checks it between
    /// lines and during back-off; if it is stuck in a read the process exits
    /// after `GRACE_PERIOD`. Every insert is already committed by then.
    pub fn install_ctrl_c(&self, quiet: bool) -> eyre::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let shutdown = self.clone();

        thread::Builder::new().name("ctrl-c".to_string()).spawn(move || {
            if let Err(e) = runtime.block_on(tokio::signal::ctrl_c()) {
                log::warn!("Failed to listen for Ctrl+C: {}", e);
                return;
            }

            log::info!("Interrupt received, stopping");
            shutdown.request();

            thread::sleep(GRACE_PERIOD);
            shutdown.announce_stopped(quiet);
            std::process::exit(0);
        })?;

        Ok(())
    }
}
