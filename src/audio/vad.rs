//! RMS voice-activity gating for captured microphone frames.
//!
//! The gate suppresses frames below an energy threshold so silence (and echo
//! of the assistant's own voice) is not streamed to the model. While remote
//! playback is active the threshold is raised by a multiplier, which keeps
//! speaker bleed from re-triggering the model mid-answer.

/// Tuning for the capture gate. The defaults match the original companion
/// app; both knobs are deliberately configurable since they are empirical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    /// RMS energy below which a frame is considered silence.
    pub base_threshold: f32,
    /// Factor applied to the base threshold while remote audio is playing.
    pub playback_multiplier: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.008,
            playback_multiplier: 5.0,
        }
    }
}

/// Outcome of gating one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateOutcome {
    /// Raw RMS energy of the frame, before any muting.
    pub rms: f32,
    /// Whether the frame cleared the active threshold.
    pub talking: bool,
}

/// Stateless per-frame gate. Frames below the active threshold are zeroed
/// in place; frames above pass through unmodified.
#[derive(Debug, Clone)]
pub struct VadGate {
    config: VadConfig,
}

impl VadGate {
    pub fn new(config: VadConfig) -> Self {
        Self { config }
    }

    /// The threshold in effect given whether remote playback is audible.
    pub fn effective_threshold(&self, remote_speaking: bool) -> f32 {
        if remote_speaking {
            self.config.base_threshold * self.config.playback_multiplier
        } else {
            self.config.base_threshold
        }
    }

    /// Gates one frame in place and reports its energy.
    pub fn apply(&self, frame: &mut [f32], remote_speaking: bool) -> GateOutcome {
        let rms = rms(frame);
        if rms < self.effective_threshold(remote_speaking) {
            frame.fill(0.0);
            GateOutcome { rms, talking: false }
        } else {
            GateOutcome { rms, talking: true }
        }
    }
}

/// Root-mean-square energy of a frame. Empty frames report zero.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
    (sum_sq / frame.len() as f32).sqrt()
}
