//! Text-to-speech using espeak-ng.
//!
//! espeak-ng keeps its state in process globals, so calls are serialized
//! behind one lock. Audio arrives through the synth callback in bursts; each
//! burst becomes one chunk, delivered once the whole text is synthesized.

#![allow(non_upper_case_globals)]

use crate::{
    bridge::AudioChunk,
    constants::ESPEAK_SAMPLE_RATE,
    synth::SpeechSynthesizer,
};
use anyhow::{bail, Context, Result};
use espeakng_sys::*;
use lazy_static::lazy_static;
use std::ffi::{c_void, CString};
use std::os::raw::{c_char, c_int, c_short};
use std::sync::{Mutex, MutexGuard};

const BUFF_LEN: i32 = 500;
const OPTIONS: i32 = 0;

/// Voice variants selected by speaker id
const VARIANTS: &[&str] = &[
    "m1", "m2", "m3", "m4", "m5", "m6", "m7", "f1", "f2", "f3", "f4", "f5",
];

lazy_static! {
    static ref ENGINE: Mutex<()> = Mutex::new(());
    static ref BURSTS: Mutex<Vec<Vec<i16>>> = Mutex::new(Vec::new());
}

pub struct EspeakSynthesizer {
    voice: String,
}

impl EspeakSynthesizer {
    pub fn new(voice: &str) -> Self {
        Self {
            voice: voice.to_string(),
        }
    }

    fn voice_for(&self, speaker_id: u32) -> String {
        let variant = VARIANTS[speaker_id as usize % VARIANTS.len()];
        format!("{}+{}", self.voice, variant)
    }
}

impl SpeechSynthesizer for EspeakSynthesizer {
    fn name(&self) -> &str {
        "espeak"
    }

    fn synthesize(
        &self,
        text: &str,
        speaker_id: u32,
        sink: &mut dyn FnMut(AudioChunk),
    ) -> Result<()> {
        let _engine = ENGINE.plock();

        let sample_rate = initialize(&self.voice_for(speaker_id))?;
        let result = synth(text);

        unsafe {
            espeak_Terminate();
        }
        result?;

        for burst in BURSTS.plock().drain(..) {
            sink(AudioChunk::new(burst, sample_rate));
        }

        Ok(())
    }
}

fn initialize(voice: &str) -> Result<u32> {
    let output: espeak_AUDIO_OUTPUT = espeak_AUDIO_OUTPUT_AUDIO_OUTPUT_RETRIEVAL;
    let path: *const c_char = std::ptr::null();

    BURSTS.plock().clear();

    let sample_rate = unsafe { espeak_Initialize(output, BUFF_LEN, path, OPTIONS) };
    if sample_rate <= 0 {
        bail!("espeak-ng failed to initialize");
    }

    let voice_cstr = CString::new(voice).context("Voice name contains a null byte")?;
    let set_voice = unsafe { espeak_SetVoiceByName(voice_cstr.as_ptr()) };
    if set_voice != espeak_ERROR_EE_OK {
        warn!("espeak-ng does not know voice {voice}, using its default");
    }

    unsafe {
        espeak_SetSynthCallback(Some(synth_callback));
    }

    let sample_rate = sample_rate as u32;
    if sample_rate != ESPEAK_SAMPLE_RATE {
        debug!("espeak-ng runs at {sample_rate} Hz");
    }

    Ok(sample_rate)
}

fn synth(text: &str) -> Result<()> {
    // Filter out null bytes to prevent CString::new from failing
    let filtered_text: String = text.chars().filter(|&c| c != '\0').collect();
    let text_cstr = CString::new(filtered_text)?;

    let position = 0u32;
    let position_type: espeak_POSITION_TYPE = 0;
    let end_position = 0u32;
    let flags = espeakCHARS_AUTO;
    let identifier = std::ptr::null_mut();
    let user_data = std::ptr::null_mut();

    let queued = unsafe {
        espeak_Synth(
            text_cstr.as_ptr() as *const c_void,
            text_cstr.as_bytes_with_nul().len(),
            position,
            position_type,
            end_position,
            flags,
            identifier,
            user_data,
        )
    };
    if queued != espeak_ERROR_EE_OK {
        bail!("espeak-ng rejected text (error {queued})");
    }

    match unsafe { espeak_Synchronize() } {
        espeak_ERROR_EE_OK => Ok(()),
        e => bail!("espeak-ng synthesis failed (error {e})"),
    }
}

unsafe extern "C" fn synth_callback(
    wav: *mut c_short,
    sample_count: c_int,
    _events: *mut espeak_EVENT,
) -> c_int {
    if !wav.is_null() && sample_count > 0 {
        let wav_slice = std::slice::from_raw_parts(wav, sample_count as usize);
        BURSTS.plock().push(wav_slice.to_vec());
    }

    0
}

trait PoisonlessLock<T> {
    fn plock(&self) -> MutexGuard<'_, T>;
}

impl<T> PoisonlessLock<T> for Mutex<T> {
    fn plock(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(l) => l,
            Err(e) => e.into_inner(),
        }
    }
}
