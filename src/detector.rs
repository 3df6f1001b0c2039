//! Change detection over a monitored file and a named text source.
//!
//! A polling task wakes once per interval, reads both inputs, and decides
//! whether there is new content to speak. At most one piece of content leaves
//! a tick, and it is handed to the [Dispatcher] so that slow synthesis never
//! delays the next tick.

use crate::{
    dispatcher::{Dispatcher, SpeechCallback},
    text_source::TextSourceLookup,
};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Duration,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{sleep, Instant},
};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum DebounceMode {
    /// Speak a change on the tick it is detected
    Immediate,

    /// Speak a change once it has been left alone for one interval
    #[default]
    Debounced,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ReadingMode {
    /// Synthesize the content in one go
    #[default]
    WholeBlock,

    /// Synthesize each non-empty line separately, in order
    LineByLine,
}

/// Polling parameters. Always replaced as a whole.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollingConfig {
    interval: Duration,
    debounce: DebounceMode,
    reading: ReadingMode,
}

impl PollingConfig {
    pub fn new(interval: Duration, debounce: DebounceMode, reading: ReadingMode) -> Result<Self> {
        if interval.is_zero() {
            bail!("Polling interval must be greater than zero");
        }

        Ok(Self {
            interval,
            debounce,
            reading,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn debounce(&self) -> DebounceMode {
        self.debounce
    }

    pub fn reading(&self) -> ReadingMode {
        self.reading
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            debounce: DebounceMode::Debounced,
            reading: ReadingMode::WholeBlock,
        }
    }
}

/// Where a source is in its debounce cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DebounceState {
    /// Nothing has changed yet
    #[default]
    Idle,

    /// Changed; speak the value once `deadline` has passed without another change
    Pending { deadline: Instant },

    /// The latest value has been spoken (or superseded)
    Emitted,
}

/// What the detector remembers about one monitored input.
#[derive(Clone, Debug, Default)]
pub struct InputSourceState {
    last_value: String,
    last_change: Option<Instant>,
    debounce: DebounceState,
}

impl InputSourceState {
    pub fn last_value(&self) -> &str {
        &self.last_value
    }

    pub fn last_change(&self) -> Option<Instant> {
        self.last_change
    }

    pub fn debounce(&self) -> DebounceState {
        self.debounce
    }

    /// Records `value` if it differs from the last one seen. Any pending
    /// emission restarts from `now`.
    fn observe(&mut self, value: String, now: Instant, quiet_period: Duration) -> bool {
        if value == self.last_value {
            return false;
        }

        self.last_value = value;
        self.last_change = Some(now);
        self.debounce = DebounceState::Pending {
            deadline: now + quiet_period,
        };

        true
    }

    /// Returns the value exactly once, on the first call after its deadline.
    fn take_due(&mut self, now: Instant) -> Option<String> {
        match self.debounce {
            DebounceState::Pending { deadline } if now > deadline => {
                self.debounce = DebounceState::Emitted;
                Some(self.last_value.clone())
            }
            _ => None,
        }
    }

    fn settle(&mut self) {
        if let DebounceState::Pending { .. } = self.debounce {
            self.debounce = DebounceState::Emitted;
        }
    }
}

/// Per-run memory of both inputs. Pure: all I/O happens in the caller.
#[derive(Clone, Debug, Default)]
pub struct DetectorState {
    file: InputSourceState,
    source: InputSourceState,
}

impl DetectorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self) -> &InputSourceState {
        &self.file
    }

    pub fn source(&self) -> &InputSourceState {
        &self.source
    }

    /// Runs one tick. `None` for an input means "not configured" or "nothing
    /// readable this tick" and leaves that input's state untouched.
    ///
    /// The text source wins over the file when both are ready in the same
    /// tick. In debounced mode the file then keeps its pending emission for
    /// the next tick.
    pub fn tick(
        &mut self,
        file_value: Option<String>,
        source_value: Option<String>,
        config: &PollingConfig,
        now: Instant,
    ) -> Option<String> {
        let quiet_period = config.interval();

        let file_changed = file_value
            .map(|value| self.file.observe(value, now, quiet_period))
            .unwrap_or(false);
        let source_changed = source_value
            .map(|value| self.source.observe(value, now, quiet_period))
            .unwrap_or(false);

        let staged = match config.debounce() {
            DebounceMode::Immediate => {
                let mut staged = None;
                if file_changed {
                    staged = Some(self.file.last_value.clone());
                }
                if source_changed {
                    staged = Some(self.source.last_value.clone());
                }

                self.file.settle();
                self.source.settle();

                staged
            }
            DebounceMode::Debounced => self
                .source
                .take_due(now)
                .or_else(|| self.file.take_due(now)),
        };

        staged.filter(|content| !content.is_empty())
    }
}

/// What to monitor. Empty means "not monitored".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputTargets {
    pub file: Option<PathBuf>,
    pub source: Option<String>,
}

struct RunningTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Handle to the polling task.
///
/// Setters may be called from any thread at any time; the loop takes a fresh
/// snapshot of targets and polling config at the start of every tick.
pub struct ChangeDetector {
    targets: watch::Sender<InputTargets>,
    polling: watch::Sender<PollingConfig>,
    callback: Arc<RwLock<Option<SpeechCallback>>>,
    lookup: Arc<dyn TextSourceLookup>,
    dispatcher: Dispatcher,
    task: Option<RunningTask>,
}

impl ChangeDetector {
    pub fn new(
        polling: PollingConfig,
        lookup: Arc<dyn TextSourceLookup>,
        dispatcher: Dispatcher,
    ) -> Self {
        let (targets, _rx) = watch::channel(InputTargets::default());
        let (polling, _rx) = watch::channel(polling);

        Self {
            targets,
            polling,
            callback: Arc::new(RwLock::new(None)),
            lookup,
            dispatcher,
            task: None,
        }
    }

    /// Starts the polling task. Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Change detector already running");
            return;
        }

        let token = CancellationToken::new();
        let poller = Poller {
            targets: self.targets.subscribe(),
            polling: self.polling.subscribe(),
            callback: self.callback.clone(),
            lookup: self.lookup.clone(),
            dispatcher: self.dispatcher.clone(),
        };

        info!("Starting change detector");
        let handle = tokio::spawn(poller.run(token.clone()));
        self.task = Some(RunningTask { token, handle });
    }

    /// Prevents the next tick from starting. A tick already in progress runs
    /// to completion; content it dispatches is still generated.
    pub fn stop(&mut self) {
        if let Some(task) = &self.task {
            if !task.token.is_cancelled() {
                info!("Stopping change detector");
                task.token.cancel();
            }
        }
    }

    /// Stops the polling task and waits for it to exit.
    pub async fn shutdown(&mut self) {
        self.stop();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.handle.await {
                error!("Change detector task failed: {e}");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.token.is_cancelled() && !task.handle.is_finished())
    }

    /// Monitors the file at `path` from the next tick on. An empty path
    /// disables file monitoring.
    pub fn set_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let file = (!path.as_os_str().is_empty()).then(|| path.to_path_buf());

        debug!("Monitoring file: {:?}", file);
        self.targets.send_modify(|targets| targets.file = file);
    }

    /// Monitors the named text source from the next tick on. An empty name
    /// disables source monitoring.
    pub fn set_source(&self, name: &str) {
        let source = (!name.is_empty()).then(|| name.to_string());

        debug!("Monitoring text source: {:?}", source);
        self.targets.send_modify(|targets| targets.source = source);
    }

    pub fn set_polling_config(&self, config: PollingConfig) {
        debug!("Polling config: {:?}", config);
        self.polling.send_replace(config);
    }

    /// Installs the sink that receives ready content.
    pub fn set_speech_callback(&self, callback: SpeechCallback) {
        let mut slot = match self.callback.write() {
            Ok(slot) => slot,
            Err(e) => e.into_inner(),
        };
        *slot = Some(callback);
    }

    pub fn targets(&self) -> InputTargets {
        self.targets.borrow().clone()
    }

    pub fn polling_config(&self) -> PollingConfig {
        *self.polling.borrow()
    }
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.token.cancel();
        }
    }
}

/// The polling task's view of the detector.
struct Poller {
    targets: watch::Receiver<InputTargets>,
    polling: watch::Receiver<PollingConfig>,
    callback: Arc<RwLock<Option<SpeechCallback>>>,
    lookup: Arc<dyn TextSourceLookup>,
    dispatcher: Dispatcher,
}

impl Poller {
    async fn run(self, token: CancellationToken) {
        let mut state = DetectorState::new();

        while !token.is_cancelled() {
            let targets = self.targets.borrow().clone();
            let polling = *self.polling.borrow();

            trace!("Checking inputs for changes");

            let file_value = match &targets.file {
                Some(path) => read_file(path).await,
                None => None,
            };
            let source_value = match targets.source {
                Some(name) => self.lookup_source(name).await,
                None => None,
            };

            if let Some(content) = state.tick(file_value, source_value, &polling, Instant::now()) {
                self.emit(content, &polling);
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(polling.interval()) => {}
            }
        }

        debug!("Change detector loop exited");
    }

    /// Runs the lookup on the blocking pool, so a slow source stalls this
    /// tick only.
    async fn lookup_source(&self, name: String) -> Option<String> {
        let lookup = self.lookup.clone();

        match tokio::task::spawn_blocking(move || lookup.text(&name)).await {
            Ok(text) => text,
            Err(e) => {
                error!("Text source lookup failed: {e}");
                None
            }
        }
    }

    fn emit(&self, content: String, polling: &PollingConfig) {
        let callback = match self.callback.read() {
            Ok(callback) => callback.clone(),
            Err(e) => e.into_inner().clone(),
        };

        match callback {
            Some(callback) => {
                debug!("Content ready for speech: {content:?}");
                self.dispatcher.dispatch(content, polling.reading(), callback);
            }
            None => debug!("Content ready but no speech callback installed"),
        }
    }
}

/// Reads the whole file. A missing file reads as empty; any other failure
/// is logged and means "nothing from the file this tick". Bytes that are not
/// valid UTF-8 are replaced rather than rejected.
async fn read_file(path: &Path) -> Option<String> {
    match tokio::fs::read(path).await {
        Ok(contents) => Some(String::from_utf8_lossy(&contents).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Some(String::new()),
        Err(e) => {
            error!("Failed to read file {}: {e}", path.display());
            None
        }
    }
}
