//! Glue between generation units, the speech engine and the audio bridge.

use crate::{
    bridge::AudioBridge,
    dispatcher::SpeechCallback,
    phonetic::Transcriber,
    synth::SpeechSynthesizer,
};
use std::sync::{Arc, RwLock};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoiceSettings {
    pub speaker_id: u32,
    pub phonetic_transcription: bool,
}

/// Owns the current engine and voice settings. Shared by every generation
/// unit; each call to [SynthesisAdapter::generate] sees the settings current
/// at the moment it starts.
pub struct SynthesisAdapter {
    synthesizer: RwLock<Arc<dyn SpeechSynthesizer>>,
    transcriber: Arc<dyn Transcriber>,
    voice: RwLock<VoiceSettings>,
    bridge: AudioBridge,
}

impl SynthesisAdapter {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transcriber: Arc<dyn Transcriber>,
        bridge: AudioBridge,
    ) -> Self {
        Self {
            synthesizer: RwLock::new(synthesizer),
            transcriber,
            voice: RwLock::new(VoiceSettings::default()),
            bridge,
        }
    }

    pub fn set_voice(&self, voice: VoiceSettings) {
        let mut current = match self.voice.write() {
            Ok(current) => current,
            Err(e) => e.into_inner(),
        };
        *current = voice;
    }

    pub fn voice(&self) -> VoiceSettings {
        match self.voice.read() {
            Ok(voice) => *voice,
            Err(e) => *e.into_inner(),
        }
    }

    /// Swaps the engine. Units already synthesizing finish on the old one.
    pub fn set_synthesizer(&self, synthesizer: Arc<dyn SpeechSynthesizer>) {
        info!("Switching speech engine to {}", synthesizer.name());

        let mut current = match self.synthesizer.write() {
            Ok(current) => current,
            Err(e) => e.into_inner(),
        };
        *current = synthesizer;
    }

    pub fn synthesizer(&self) -> Arc<dyn SpeechSynthesizer> {
        match self.synthesizer.read() {
            Ok(synthesizer) => synthesizer.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }

    /// The text that would be synthesized for `text` with current settings.
    pub fn prepare_text(&self, text: &str) -> String {
        if !self.voice().phonetic_transcription {
            return text.to_string();
        }

        let transcribed = self.transcriber.transcribe(text);
        if transcribed != text {
            debug!("Phonetic transcription: {text:?} -> {transcribed:?}");
        }
        transcribed
    }

    /// Synthesizes `text` and queues the audio on the bridge. Blocks for the
    /// duration of synthesis. Failures are logged; whatever audio was
    /// produced before a failure stays queued.
    pub fn generate(&self, text: &str) {
        let text = self.prepare_text(text);
        if text.trim().is_empty() {
            return;
        }

        let speaker_id = self.voice().speaker_id;
        let synthesizer = self.synthesizer();
        let bridge = &self.bridge;

        debug!(
            "Synthesizing {text:?} with {} (speaker {speaker_id})",
            synthesizer.name()
        );

        let result = synthesizer.synthesize(&text, speaker_id, &mut |chunk| {
            bridge.push_chunk(chunk)
        });

        if let Err(e) = result {
            error!("Speech synthesis failed for {text:?}: {e:?}");
        }
    }

    /// A speech callback that generates through this adapter.
    pub fn speech_callback(self: &Arc<Self>) -> SpeechCallback {
        let adapter = self.clone();
        Arc::new(move |text: &str| adapter.generate(text))
    }

    pub fn bridge(&self) -> &AudioBridge {
        &self.bridge
    }
}
