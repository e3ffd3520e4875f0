//! Refresh scheduler
//!
//! Owns one repeating timer per instance:
//! - An immediate refresh-all when started, so consumers never wait a full
//!   interval for first data
//! - A refresh-all on every tick after that
//! - `stop()` guarantees no further fetch is started by this instance
//!
//! Each refresh-all runs as its own task; a slow round does not delay the
//! next tick, and stopping does not cancel a round already in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::MIN_REFRESH_INTERVAL_MS;
use crate::fetcher::CollectionFetcher;

pub struct RefreshScheduler {
    fetcher: Arc<CollectionFetcher>,
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    interval: Option<Duration>,
}

impl RefreshScheduler {
    pub fn new(fetcher: Arc<CollectionFetcher>) -> Self {
        Self {
            fetcher,
            stopped: Arc::new(AtomicBool::new(true)),
            handle: None,
            interval: None,
        }
    }

    /// Start the scheduler loop. Restarting replaces the previous timer.
    /// Intervals below `MIN_REFRESH_INTERVAL_MS` are clamped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, interval: Duration) {
        self.stop();

        let interval = interval.max(Duration::from_millis(MIN_REFRESH_INTERVAL_MS));

        let stopped = Arc::new(AtomicBool::new(false));
        self.stopped = stopped.clone();
        self.interval = Some(interval);

        let fetcher = self.fetcher.clone();
        log::info!("Scheduler: started, refreshing every {}ms", interval.as_millis());

        self.handle = Some(tokio::spawn(async move {
            spawn_refresh(&fetcher, &stopped);

            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                log::debug!("Scheduler: tick");
                spawn_refresh(&fetcher, &stopped);
            }
        }));
    }

    /// Stop the timer. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            log::info!("Scheduler: stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && self.handle.is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_refresh(fetcher: &Arc<CollectionFetcher>, stopped: &Arc<AtomicBool>) {
    if stopped.load(Ordering::SeqCst) {
        return;
    }
    let fetcher = fetcher.clone();
    let stopped = stopped.clone();
    tokio::spawn(async move {
        // stop() may land between spawn and first poll
        if stopped.load(Ordering::SeqCst) {
            return;
        }
        fetcher.refresh_all().await;
    });
}
