//! Speech synthesis backends.
//!
//! The rest of the crate only sees [SpeechSynthesizer]: give it text and a
//! speaker, receive audio chunks as the engine produces them.

#[cfg(feature = "espeak")]
pub mod espeak;
pub mod tone;

use crate::bridge::AudioChunk;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A text-to-speech engine.
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Synthesizes `text`, handing chunks to `sink` in playback order.
    /// Engines may deliver chunks while synthesizing or all at the end.
    /// Blocks until synthesis is finished.
    fn synthesize(
        &self,
        text: &str,
        speaker_id: u32,
        sink: &mut dyn FnMut(AudioChunk),
    ) -> Result<()>;
}

/// Which engine to use, as selected in settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SynthBackend {
    /// Beeps in the rhythm of the text. Needs no system libraries.
    #[default]
    Tone,

    /// espeak-ng, available with the `espeak` feature
    Espeak {
        #[serde(default = "default_espeak_voice")]
        voice: String,
    },
}

fn default_espeak_voice() -> String {
    "en".to_string()
}

pub fn create(backend: &SynthBackend) -> Result<Arc<dyn SpeechSynthesizer>> {
    match backend {
        SynthBackend::Tone => Ok(Arc::new(tone::ToneSynthesizer::default())),

        #[cfg(feature = "espeak")]
        SynthBackend::Espeak { voice } => Ok(Arc::new(espeak::EspeakSynthesizer::new(voice))),

        #[cfg(not(feature = "espeak"))]
        SynthBackend::Espeak { .. } => {
            anyhow::bail!("espeak backend requested but squawk was built without the espeak feature")
        }
    }
}
