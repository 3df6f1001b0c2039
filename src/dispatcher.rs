//! Runs speech generation off the polling task.
//!
//! Each piece of content becomes one generation unit. A unit waits for one of
//! a bounded number of slots and then calls the speech callback on the
//! blocking pool, once per line or once for the whole block. Dispatching
//! never waits for a slot, so detection keeps its cadence however slow
//! synthesis is.

use crate::detector::ReadingMode;
use anyhow::{bail, Result};
use itertools::Itertools;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    runtime::Handle,
    sync::{watch, Semaphore},
};
use tokio_util::task::TaskTracker;

/// Sink that turns text into audio. May block for as long as synthesis takes.
pub type SpeechCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Bounded generation runner.
///
/// Only running units are bounded. Units waiting for a slot are queued
/// without limit and never superseded: when content arrives faster than it
/// can be spoken, every piece is still spoken, in order, and latency grows.
#[derive(Clone)]
pub struct Dispatcher {
    tracker: TaskTracker,
    slots: Arc<Semaphore>,
    /// Tickets hand out slot-queue positions in dispatch order; `serving` is
    /// the ticket allowed to wait for a slot next.
    tickets: Arc<AtomicU64>,
    serving: Arc<watch::Sender<u64>>,
    runtime: Handle,
}

impl Dispatcher {
    /// Creates a dispatcher that runs at most `max_concurrent` units at a
    /// time. Must be called from within a tokio runtime.
    pub fn new(max_concurrent: usize) -> Result<Self> {
        Self::with_runtime(max_concurrent, Handle::current())
    }

    pub fn with_runtime(max_concurrent: usize, runtime: Handle) -> Result<Self> {
        if max_concurrent == 0 {
            bail!("At least one concurrent generation slot is required");
        }

        Ok(Self {
            tracker: TaskTracker::new(),
            slots: Arc::new(Semaphore::new(max_concurrent)),
            tickets: Arc::new(AtomicU64::new(0)),
            serving: Arc::new(watch::channel(0).0),
            runtime,
        })
    }

    /// Submits `content` as one generation unit. Returns immediately.
    ///
    /// Units queue for slots in submission order. Callback failures are not
    /// observed beyond logging a panic.
    pub fn dispatch(&self, content: String, mode: ReadingMode, callback: SpeechCallback) {
        if self.tracker.is_closed() {
            warn!("Dispatcher is shut down, dropping content: {content:?}");
            return;
        }

        let units = split_units(&content, mode);
        if units.is_empty() {
            return;
        }

        debug!("Dispatching {} unit(s) in {:?} mode", units.len(), mode);

        let slots = self.slots.clone();
        let serving = self.serving.clone();
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst);
        let mut turn = serving.subscribe();

        self.tracker.spawn_on(
            async move {
                // Tasks may first run in any order; queue for a slot in ticket order
                if turn.wait_for(|next| *next == ticket).await.is_err() {
                    return;
                }
                let slot = slots.acquire_owned().await;
                serving.send_modify(|next| *next += 1);

                let Ok(_slot) = slot else {
                    return;
                };

                let result = tokio::task::spawn_blocking(move || {
                    for unit in &units {
                        trace!("Generating speech from input: {unit:?}");
                        callback(unit);
                    }
                })
                .await;

                if let Err(e) = result {
                    error!("Speech generation unit failed: {e}");
                }
            },
            &self.runtime,
        );
    }

    /// Units submitted and not yet finished, including those waiting for a slot.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stops accepting units and waits up to `timeout` for in-flight units.
    ///
    /// Units still running after the timeout are abandoned: they are not
    /// cancelled and keep running until their synthesis returns. Returns
    /// `true` if everything finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "Abandoning {} speech generation unit(s) still in flight",
                    self.tracker.len()
                );
                false
            }
        }
    }
}

/// Splits content into the texts handed to the speech callback.
pub fn split_units(content: &str, mode: ReadingMode) -> Vec<String> {
    match mode {
        ReadingMode::WholeBlock if content.is_empty() => vec![],
        ReadingMode::WholeBlock => vec![content.to_string()],
        ReadingMode::LineByLine => content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect_vec(),
    }
}
