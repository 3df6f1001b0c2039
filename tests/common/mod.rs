//! Test infrastructure for squawk-rs integration tests.
//!
//! Provides a recording speech engine, config builders and polling helpers
//! for driving the pipeline without real audio hardware or espeak.

#![allow(dead_code)]

use anyhow::Result;
use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

// Re-export key types from the main crate
pub use squawk_rs::bridge::{AudioBridge, AudioChunk};
pub use squawk_rs::config::{Config, Settings};
pub use squawk_rs::detector::{DebounceMode, ReadingMode};
pub use squawk_rs::event::{Event, EventBus, SpeechAction};
pub use squawk_rs::pipeline::Pipeline;
pub use squawk_rs::synth::SpeechSynthesizer;
pub use squawk_rs::text_source::TextSources;

/// Sample rate used by [RecordingSynth] chunks.
pub const RECORDING_RATE: u32 = 16000;

/// Speech engine that records every request and renders each character as
/// one sample, so tests can read spoken text back out of the bridge.
#[derive(Default)]
pub struct RecordingSynth {
    pub spoken: Mutex<Vec<String>>,
}

impl RecordingSynth {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl SpeechSynthesizer for RecordingSynth {
    fn name(&self) -> &str {
        "recording"
    }

    fn synthesize(
        &self,
        text: &str,
        _speaker_id: u32,
        sink: &mut dyn FnMut(AudioChunk),
    ) -> Result<()> {
        sink(AudioChunk::new(
            text.chars().map(|c| c as i16).collect(),
            RECORDING_RATE,
        ));
        // Recorded after the push, so a caller that saw this is spoken can pull it
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Decodes audio produced by [RecordingSynth] back into text.
pub fn decode(samples: &[i16]) -> String {
    samples
        .iter()
        .filter_map(|&s| char::from_u32(s as u32))
        .collect()
}

/// A config with fast polling, suitable for tests.
pub fn test_config(debounce: DebounceMode, reading: ReadingMode) -> Config {
    let mut config = Config::default();
    config.polling.interval_ms = 20;
    config.polling.debounce = debounce;
    config.polling.reading = reading;
    config.generation.shutdown_timeout_ms = 2000;
    config
}

/// Creates a pipeline monitoring `sources` and swaps in a [RecordingSynth].
pub fn recording_pipeline(config: &Config, sources: &TextSources) -> (Pipeline, Arc<RecordingSynth>) {
    let pipeline = Pipeline::create(config, Arc::new(sources.clone())).unwrap();
    let synth = Arc::new(RecordingSynth::default());
    pipeline.adapter().set_synthesizer(synth.clone());
    (pipeline, synth)
}

/// Waits until `synth` has been asked to speak at least `count` times.
pub async fn wait_for_speech(synth: &RecordingSynth, count: usize) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let spoken = synth.spoken();
        if spoken.len() >= count {
            return spoken;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {count} utterance(s), got {spoken:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Replaces the file in one step so the detector never sees a partial write.
pub fn write_atomic(path: &Path, contents: &str) {
    let staging = path.with_extension("staging");
    std::fs::write(&staging, contents).unwrap();
    std::fs::rename(&staging, path).unwrap();
}
