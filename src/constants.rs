// Define some constants for the audio parameters
pub const OUTPUT_SAMPLE_RATE: u32 = 48000; // 48 kHz host stream
pub const BIT_DEPTH: u16 = 16; // 16 bits per sample
pub const CHANNELS: u16 = 2; // Stereo channel

/// Native rate of espeak-ng output
pub const ESPEAK_SAMPLE_RATE: u32 = 22050;
