//! Realtime voice-companion core for the CareBot renal-health app.
//!
//! One [`VoiceSession`] owns a bidirectional connection to the Gemini Live
//! speech API. Captured microphone frames are gated by an RMS voice-activity
//! heuristic (with echo suppression while the assistant is audible), encoded
//! as base64 PCM16 and streamed up; returned audio is decoded and handed to
//! a playback scheduler that keeps start times monotonic, inserts a fixed
//! lookahead after underruns and drops everything on barge-in. The single
//! `navigate` tool is dispatched as a closed variant and answered
//! automatically; grounding sources are collected per session.
//!
//! See `demos/voice_companion.rs` for a full wiring against real audio
//! devices via cpal.

pub mod audio;
pub mod error;
pub mod session;
pub mod types;

pub use audio::{
    BufferId, OutputClock, PlaybackCommand, PlaybackScheduler, ScheduledBuffer, VadConfig, VadGate,
};
pub use error::LiveError;
pub use session::{
    CaptureLevels, EventHandler, NavigateContext, ServerContentContext, SessionStatus,
    ToolInvocation, VoiceSession, VoiceSessionBuilder,
};
