//! One text-to-speech source: detector, dispatcher, engine and bridge wired
//! together, plus the lifecycle the host drives (create, update, destroy).

use crate::{
    adapter::{SynthesisAdapter, VoiceSettings},
    bridge::AudioBridge,
    config::{Config, Settings},
    detector::{ChangeDetector, PollingConfig, ReadingMode},
    dispatcher::Dispatcher,
    event::{Event, EventBus, SpeechAction},
    phonetic::{RuleTranscriber, Transcriber},
    synth,
    text_source::TextSourceLookup,
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

pub struct Pipeline {
    settings: Settings,
    adapter: Arc<SynthesisAdapter>,
    detector: ChangeDetector,
    dispatcher: Dispatcher,
    shutdown_timeout: Duration,
}

impl Pipeline {
    /// Builds the pipeline, applies `config.settings` and starts change
    /// detection. Must be called from within a tokio runtime.
    pub fn create(config: &Config, lookup: Arc<dyn TextSourceLookup>) -> Result<Self> {
        config.validate()?;

        let synthesizer = synth::create(&config.settings.backend)?;
        let transcriber: Arc<dyn Transcriber> = if config.phonetic_rules.is_empty() {
            Arc::new(RuleTranscriber::with_defaults())
        } else {
            Arc::new(RuleTranscriber::new(config.phonetic_rules.clone()))
        };
        let adapter = Arc::new(SynthesisAdapter::new(
            synthesizer,
            transcriber,
            AudioBridge::new(),
        ));

        let dispatcher = Dispatcher::new(config.generation.max_concurrent)?;
        let mut detector = ChangeDetector::new(
            config.polling.to_polling_config()?,
            lookup,
            dispatcher.clone(),
        );
        detector.set_speech_callback(adapter.speech_callback());

        let mut pipeline = Self {
            settings: config.settings.clone(),
            adapter,
            detector,
            dispatcher,
            shutdown_timeout: config.generation.shutdown_timeout(),
        };

        // Targets are in place before the first tick
        pipeline.apply(&config.settings);
        pipeline.detector.start();

        Ok(pipeline)
    }

    /// Replaces all settings. The engine is recreated only when the backend
    /// changed; if that fails nothing is changed.
    pub fn update(&mut self, settings: Settings) -> Result<()> {
        if settings.backend != self.settings.backend {
            let synthesizer = synth::create(&settings.backend)?;
            self.adapter.set_synthesizer(synthesizer);
        }

        self.apply(&settings);
        self.settings = settings;

        Ok(())
    }

    fn apply(&self, settings: &Settings) {
        info!(
            "Applying settings: source {:?}, file {:?}, speaker {}",
            settings.source_name(),
            settings.file_path(),
            settings.speaker_id
        );

        self.adapter.set_voice(VoiceSettings {
            speaker_id: settings.speaker_id,
            phonetic_transcription: settings.phonetic_transcription,
        });
        self.detector.set_source(settings.source_name().unwrap_or_default());
        self.detector.set_file(&settings.file);
    }

    pub fn set_polling_config(&self, config: PollingConfig) {
        self.detector.set_polling_config(config);
    }

    /// Speaks the `text` setting without waiting for generation.
    pub fn generate_now(&self) {
        info!("Generating speech for configured text");
        self.speak(&self.settings.text);
    }

    /// Speaks `text` as one block without waiting for generation.
    pub fn speak(&self, text: &str) {
        self.dispatcher.dispatch(
            text.to_string(),
            ReadingMode::WholeBlock,
            self.adapter.speech_callback(),
        );
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn adapter(&self) -> &Arc<SynthesisAdapter> {
        &self.adapter
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn bridge(&self) -> AudioBridge {
        self.adapter.bridge().clone()
    }

    /// Stops detection, then waits up to the configured timeout for
    /// generation units before abandoning them, then drops queued audio.
    pub async fn destroy(mut self) {
        info!("Destroying speech pipeline");

        self.detector.shutdown().await;
        self.dispatcher.shutdown(self.shutdown_timeout).await;
        self.adapter.bridge().clear();
    }
}

/// Drives `pipeline` from bus events until [Event::Shutdown] or until the
/// bus goes away, then destroys it.
pub fn init(bus: &EventBus, mut pipeline: Pipeline) -> JoinHandle<()> {
    let mut subscriber = bus.subscribe();

    tokio::spawn(async move {
        while let Some(event) = subscriber.recv().await {
            match event {
                Event::UpdateSettings(settings) => {
                    if let Err(e) = pipeline.update(*settings) {
                        error!("Failed to apply settings: {e:?}");
                    }
                }
                Event::Speech(SpeechAction::Speak { text }) => pipeline.speak(&text),
                Event::Speech(SpeechAction::GenerateNow) => pipeline.generate_now(),
                Event::Shutdown => break,
            }
        }

        pipeline.destroy().await;
    })
}
