//! # Progress Estimate
//!
//! **The value produced here is fabricated.** The processing service reports
//! nothing while it works, so this module synthesises a number for the user
//! interface: it climbs by a fixed step on a fixed tick while a request is
//! outstanding and stops at a cap below 100. It says nothing about how much
//! work the service has actually done and must not be treated as a
//! completion percentage.
//!
//! ## Lifecycle
//!
//! ```text
//! start()      0 -> 10 -> 20 ... -> 90 (cap, every 200 ms)
//! complete()   100, then 0 after 1000 ms
//! fail()       unchanged, then 0 after 1000 ms
//! drop         ticking stops, value left as is
//! ```
//!
//! Observers read the value through a `tokio::sync::watch` subscription; the
//! transport never reads it back.

use log::debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};

use crate::common::config::ProgressConfig;

/// Value reported once the service has actually answered successfully.
pub const PROGRESS_DONE: u8 = 100;

struct Inner {
    tx: watch::Sender<u8>,
    config: ProgressConfig,
    /// Pending reset-to-0 task from the previous operation
    reset: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn cancel_reset(&self) {
        if let Ok(mut slot) = self.reset.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    fn schedule_reset(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let settle = Duration::from_millis(self.config.settle_ms);
        let task = tokio::spawn(async move {
            sleep(settle).await;
            inner.tx.send_replace(0);
        });

        if let Ok(mut slot) = self.reset.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
    }
}

/// Source of the fabricated progress value for one operation at a time.
///
/// Create one estimator per concurrent operation; estimators never share
/// state. Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct ProgressEstimator {
    inner: Arc<Inner>,
}

impl ProgressEstimator {
    pub fn new(config: ProgressConfig) -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                tx,
                config,
                reset: Mutex::new(None),
            }),
        }
    }

    /// Receiver that sees every published value (latest wins).
    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.inner.tx.subscribe()
    }

    /// Current value, 0–100.
    pub fn value(&self) -> u8 {
        *self.inner.tx.borrow()
    }

    /// Resets to 0 and starts ticking. Cancels a reset still pending from a
    /// previous operation so it cannot clobber this one.
    pub fn start(&self) -> ProgressHandle {
        self.inner.cancel_reset();
        self.inner.tx.send_replace(0);

        let inner = Arc::clone(&self.inner);
        let tick = Duration::from_millis(inner.config.tick_ms.max(1));
        let step = inner.config.step;
        let cap = inner.config.cap.min(PROGRESS_DONE - 1);

        let ticker = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + tick, tick);
            loop {
                ticks.tick().await;
                let mut value = 0;
                inner.tx.send_modify(|v| {
                    *v = v.saturating_add(step).min(cap);
                    value = *v;
                });
                debug!("Progress estimate: {}%", value);
                if value >= cap {
                    break;
                }
            }
        });

        ProgressHandle {
            inner: Arc::clone(&self.inner),
            ticker: Some(ticker),
        }
    }
}

/// Running estimate. Ticking stops on [`complete`](Self::complete),
/// [`fail`](Self::fail), or when the handle is dropped, whichever comes first.
pub struct ProgressHandle {
    inner: Arc<Inner>,
    ticker: Option<JoinHandle<()>>,
}

impl ProgressHandle {
    fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    /// The request succeeded: report 100, then reset to 0 after settling.
    pub fn complete(mut self) {
        self.stop();
        self.inner.tx.send_replace(PROGRESS_DONE);
        self.inner.schedule_reset();
    }

    /// The request failed: freeze the value, then reset to 0 after settling.
    pub fn fail(mut self) {
        self.stop();
        self.inner.schedule_reset();
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
