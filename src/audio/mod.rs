pub mod pcm;
pub mod playback;
pub mod vad;

pub use playback::{BufferId, OutputClock, PlaybackCommand, PlaybackScheduler, ScheduledBuffer};
pub use vad::{VadConfig, VadGate};

/// Sample rate (16kHz) the live API accepts for captured audio.
pub const CAPTURE_SAMPLE_RATE_HZ: u32 = 16_000;
/// Sample rate (24kHz) of the PCM audio the live API sends back.
pub const PLAYBACK_SAMPLE_RATE_HZ: u32 = 24_000;
