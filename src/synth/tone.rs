//! A stand-in synthesizer that renders text as a melody of short tones,
//! one chunk per word.

use crate::{
    bridge::{AudioChunk, Sample},
    synth::SpeechSynthesizer,
};
use anyhow::Result;

pub const TONE_SAMPLE_RATE: u32 = 22050;

const AMPLITUDE: f64 = 0.3; // 30% amplitude
const BASE_FREQUENCY: f64 = 220.0;
const SPEAKER_STEP: f64 = 30.0;
const MILLIS_PER_CHAR: u32 = 40;
const MAX_WORD_MILLIS: u32 = 600;
const GAP_MILLIS: u32 = 60;

pub struct ToneSynthesizer {
    sample_rate: u32,
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        Self::new(TONE_SAMPLE_RATE)
    }
}

impl ToneSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    fn frames(&self, millis: u32) -> usize {
        (self.sample_rate as u64 * millis as u64 / 1000) as usize
    }

    /// Renders one word followed by a short gap of silence.
    fn render_word(&self, word: &str, speaker_id: u32) -> Vec<Sample> {
        let chars = word.chars().count() as u32;
        let vowels = word
            .chars()
            .filter(|c| "aeiouyAEIOUY".contains(*c))
            .count();

        // Vowel-heavy words sing a little higher
        let f = BASE_FREQUENCY + speaker_id as f64 * SPEAKER_STEP + vowels as f64 * 20.0;
        let tone_frames = self.frames((chars * MILLIS_PER_CHAR).min(MAX_WORD_MILLIS));

        let mut samples = Vec::with_capacity(tone_frames + self.frames(GAP_MILLIS));
        let mut phase = 0.0;
        for _ in 0..tone_frames {
            samples.push(sine_wave(phase));

            // Increment the phase by the frequency divided by the sample rate
            phase += f / self.sample_rate as f64;
            phase %= 1.0;
        }
        samples.resize(samples.len() + self.frames(GAP_MILLIS), 0);

        samples
    }
}

impl SpeechSynthesizer for ToneSynthesizer {
    fn name(&self) -> &str {
        "tone"
    }

    fn synthesize(
        &self,
        text: &str,
        speaker_id: u32,
        sink: &mut dyn FnMut(AudioChunk),
    ) -> Result<()> {
        for word in text.split_whitespace() {
            sink(AudioChunk::new(
                self.render_word(word, speaker_id),
                self.sample_rate,
            ));
        }

        Ok(())
    }
}

// Generate a sine wave sample given a phase
fn sine_wave(phase: f64) -> Sample {
    // Convert the phase to radians and take the sine
    let sample = (phase * std::f64::consts::PI * 2.0).sin();
    // Scale the sample by the amplitude and the maximum value of i16
    let amplitude = i16::MAX as f64 * AMPLITUDE;
    (sample * amplitude) as Sample
}
