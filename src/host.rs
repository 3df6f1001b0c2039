//! A fixed-rate consumer of the audio bridge.
//!
//! Stands in for the host's real-time audio callback: every tick it needs a
//! fixed number of 48 kHz stereo frames, pulls whatever the bridge has,
//! converts each chunk's rate to the output rate and fills any shortfall
//! with silence.

use crate::{
    bridge::{AudioBridge, PulledAudio, Sample},
    constants::OUTPUT_SAMPLE_RATE,
};
use anyhow::Result;
use rubato::{FftFixedIn, Resampler};
use std::collections::VecDeque;
use tokio::sync::watch;

const TARGET_CHUNK_SIZE: usize = 960; // 20ms at 48kHz
const RESAMPLER_CHUNK_SIZE: usize = 1024;

pub type StereoSample = (Sample, Sample);
pub type HostOutput = watch::Receiver<Vec<StereoSample>>;

/// Starts pulling from `bridge` at the output rate.
pub fn init(bridge: AudioBridge) -> HostOutput {
    let (tx, rx) = watch::channel(Default::default());

    tokio::spawn(async move {
        let start_time = std::time::Instant::now();
        let mut sample_send_count = 0;
        let mut matcher = RateMatcher::new(OUTPUT_SAMPLE_RATE);

        let sleep_time = std::time::Duration::from_micros(
            ((TARGET_CHUNK_SIZE as f64 / OUTPUT_SAMPLE_RATE as f64) * 1_000_000.0) as u64,
        );

        loop {
            let expected_sent_samples = ((start_time.elapsed() + sleep_time).as_secs_f64()
                * OUTPUT_SAMPLE_RATE as f64) as u64;

            let chunk_size = expected_sent_samples.saturating_sub(sample_send_count) as usize;

            matcher.fill(&bridge, chunk_size);
            let chunk = matcher.take(chunk_size);

            if tx.send(chunk).is_err() {
                debug!("No listeners left for host output, stopping");
                break;
            }
            sample_send_count += chunk_size as u64;

            tokio::time::sleep(sleep_time).await;
        }
    });

    rx
}

struct StreamResampler {
    input_rate: u32,
    resampler: FftFixedIn<f64>,
    pending: Vec<f64>,
}

impl StreamResampler {
    fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        let resampler = FftFixedIn::<f64>::new(
            input_rate as usize,
            output_rate as usize,
            RESAMPLER_CHUNK_SIZE,
            2, // sub-chunks
            1, // mono input
        )?;

        Ok(Self {
            input_rate,
            resampler,
            pending: Vec::with_capacity(RESAMPLER_CHUNK_SIZE),
        })
    }

    /// Resamples every complete input chunk. With `flush`, the remainder is
    /// padded with silence and pushed through as well.
    fn process_pending(&mut self, output: &mut VecDeque<StereoSample>, flush: bool) {
        let mut processed_any = false;

        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                if !flush || self.pending.is_empty() {
                    break;
                }
                self.pending.resize(needed, 0.0);
            }

            let chunk = vec![self.pending.drain(..needed).collect::<Vec<f64>>()];
            self.process(&chunk, output);
            processed_any = true;
        }

        if flush && processed_any {
            // Push the resampler's delay line out as well
            let silence = vec![vec![0.0; self.resampler.input_frames_next()]];
            self.process(&silence, output);
            self.resampler.reset();
        }
    }

    fn process(&mut self, chunk: &[Vec<f64>], output: &mut VecDeque<StereoSample>) {
        match self.resampler.process(chunk, None) {
            Ok(resampled) => {
                if let Some(channel) = resampled.first() {
                    // Convert f64 back to i16 stereo samples
                    output.extend(channel.iter().map(|&sample| {
                        let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                        (s, s) // Mono to stereo
                    }));
                }
            }
            Err(e) => {
                warn!("Resampling error: {e}");
            }
        }
    }
}

/// Turns pulled chunks of any rate into stereo frames at one output rate.
pub struct RateMatcher {
    output_rate: u32,
    resampler: Option<StreamResampler>,
    output: VecDeque<StereoSample>,
}

impl RateMatcher {
    pub fn new(output_rate: u32) -> Self {
        Self {
            output_rate,
            resampler: None,
            output: VecDeque::new(),
        }
    }

    /// Output frames ready to be taken.
    pub fn buffered(&self) -> usize {
        self.output.len()
    }

    /// Pulls from `bridge` until `frames` output frames are ready or the
    /// bridge has nothing more to give right now. Never waits on a producer.
    pub fn fill(&mut self, bridge: &AudioBridge, frames: usize) {
        while self.output.len() < frames {
            let input_rate = match bridge.try_next_sample_rate() {
                Some(Some(rate)) => rate,
                Some(None) => {
                    // Dry: let the tail of the last utterance through
                    self.flush();
                    break;
                }
                // Busy: try again on the next tick
                None => break,
            };

            let missing = (frames - self.output.len()) as u64;
            let wanted = (missing * input_rate as u64).div_ceil(self.output_rate as u64);
            let pulled = bridge.pull((wanted as usize).max(1));
            if pulled.is_empty() {
                break;
            }

            self.feed(&pulled);
        }
    }

    pub fn feed(&mut self, pulled: &PulledAudio) {
        let Some(input_rate) = pulled.sample_rate else {
            return;
        };

        if input_rate == self.output_rate {
            self.flush();
            self.output
                .extend(pulled.samples.iter().map(|&sample| (sample, sample)));
            return;
        }

        let current_rate = self.resampler.as_ref().map(|r| r.input_rate);
        if current_rate != Some(input_rate) {
            self.flush();
            match StreamResampler::new(input_rate, self.output_rate) {
                Ok(resampler) => self.resampler = Some(resampler),
                Err(e) => {
                    error!("Cannot resample {input_rate} Hz audio: {e}");
                    self.resampler = None;
                    return;
                }
            }
        }

        if let Some(resampler) = &mut self.resampler {
            // Convert i16 to f64 normalized
            resampler
                .pending
                .extend(pulled.samples.iter().map(|&s| s as f64 / 32768.0));
            resampler.process_pending(&mut self.output, false);
        }
    }

    fn flush(&mut self) {
        if let Some(resampler) = &mut self.resampler {
            resampler.process_pending(&mut self.output, true);
        }
    }

    /// Takes exactly `count` frames, padding with silence on underrun.
    pub fn take(&mut self, count: usize) -> Vec<StereoSample> {
        let available = count.min(self.output.len());
        let mut samples: Vec<StereoSample> = self.output.drain(..available).collect();
        samples.resize(count, (0, 0));
        samples
    }
}
