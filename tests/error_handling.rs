//! Integration tests for failures that must not take the pipeline down.

mod common;

use anyhow::bail;
use common::*;
use std::{sync::Arc, time::Duration};

#[test]
fn test_invalid_config_is_rejected() {
    assert!(Config::parse("[polling]\ninterval_ms = 0\n").is_err());
    assert!(Config::parse("[generation]\nmax_concurrent = 0\n").is_err());
    assert!(Config::parse("[[phonetic_rules]]\npattern = \"(\"\nreplacement = \"x\"\n").is_err());
}

#[tokio::test]
async fn test_create_rejects_invalid_config() {
    let mut config = Config::default();
    config.polling.interval_ms = 0;

    assert!(Pipeline::create(&config, Arc::new(TextSources::new())).is_err());
}

#[cfg(not(feature = "espeak"))]
#[tokio::test]
async fn test_unavailable_backend_leaves_settings_unchanged() {
    let config = test_config(DebounceMode::Immediate, ReadingMode::WholeBlock);
    let mut pipeline = Pipeline::create(&config, Arc::new(TextSources::new())).unwrap();

    let mut settings = pipeline.settings().clone();
    settings.speaker_id = 3;
    settings.backend = squawk_rs::synth::SynthBackend::Espeak {
        voice: "en".to_string(),
    };

    assert!(pipeline.update(settings).is_err());
    assert_eq!(pipeline.settings().speaker_id, 0);
    assert_eq!(pipeline.adapter().synthesizer().name(), "tone");

    pipeline.destroy().await;
}

#[tokio::test]
async fn test_unreadable_file_does_not_stop_source() {
    let dir = tempfile::tempdir().unwrap();
    let sources = TextSources::new();

    let mut config = test_config(DebounceMode::Immediate, ReadingMode::WholeBlock);
    // A directory cannot be read as text
    config.settings.file = dir.path().to_string_lossy().to_string();
    config.settings.input_source = "ticker".to_string();

    let (pipeline, synth) = recording_pipeline(&config, &sources);

    tokio::time::sleep(Duration::from_millis(60)).await;
    sources.set("ticker", "still here");

    assert_eq!(wait_for_speech(&synth, 1).await, vec!["still here"]);
    pipeline.destroy().await;
}

#[tokio::test]
async fn test_engine_failure_does_not_stop_detection() {
    struct FlakySynth {
        inner: RecordingSynth,
    }

    impl SpeechSynthesizer for FlakySynth {
        fn name(&self) -> &str {
            "flaky"
        }

        fn synthesize(
            &self,
            text: &str,
            speaker_id: u32,
            sink: &mut dyn FnMut(AudioChunk),
        ) -> anyhow::Result<()> {
            if text.contains("boom") {
                self.inner.spoken.lock().unwrap().push(text.to_string());
                bail!("engine crashed on {text}");
            }
            self.inner.synthesize(text, speaker_id, sink)
        }
    }

    let sources = TextSources::new();
    let mut config = test_config(DebounceMode::Immediate, ReadingMode::WholeBlock);
    config.settings.input_source = "ticker".to_string();

    let pipeline = Pipeline::create(&config, Arc::new(sources.clone())).unwrap();
    let synth = Arc::new(FlakySynth {
        inner: RecordingSynth::default(),
    });
    pipeline.adapter().set_synthesizer(synth.clone());

    sources.set("ticker", "boom");
    wait_for_speech(&synth.inner, 1).await;
    sources.set("ticker", "recovered");

    assert_eq!(
        wait_for_speech(&synth.inner, 2).await,
        vec!["boom", "recovered"]
    );
    assert_eq!(decode(&pipeline.bridge().pull(100).samples), "recovered");

    pipeline.destroy().await;
}

#[tokio::test]
async fn test_destroy_abandons_stuck_generation() {
    struct StuckSynth;

    impl SpeechSynthesizer for StuckSynth {
        fn name(&self) -> &str {
            "stuck"
        }

        fn synthesize(
            &self,
            _text: &str,
            _speaker_id: u32,
            _sink: &mut dyn FnMut(AudioChunk),
        ) -> anyhow::Result<()> {
            std::thread::sleep(Duration::from_millis(800));
            Ok(())
        }
    }

    let mut config = test_config(DebounceMode::Immediate, ReadingMode::WholeBlock);
    config.generation.shutdown_timeout_ms = 100;

    let pipeline = Pipeline::create(&config, Arc::new(TextSources::new())).unwrap();
    pipeline.adapter().set_synthesizer(Arc::new(StuckSynth));
    pipeline.speak("never finishes in time");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    pipeline.destroy().await;

    assert!(started.elapsed() < Duration::from_millis(600));
}
