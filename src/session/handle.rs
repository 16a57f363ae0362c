//! The caller-facing session handle.
//!
//! Cloneable; every clone feeds the same connection task. Closing (or
//! dropping the last handle) signals the task, which tears the websocket
//! down and stops touching session state.

use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use crate::audio::BufferId;
use crate::error::LiveError;
use crate::types::{ClientMessage, GroundingSource, RealtimeInputPayload};

use super::builder::VoiceSessionBuilder;
use super::capture::{CaptureLevels, CapturePipeline};
use super::{SessionShared, SessionStatus};

#[derive(Clone)]
pub struct VoiceSession<S: Clone + Send + Sync + 'static> {
    pub(crate) shutdown_tx: Arc<TokioMutex<Option<oneshot::Sender<()>>>>,
    pub(crate) outgoing: Option<mpsc::Sender<ClientMessage>>,
    pub(crate) capture: CapturePipeline,
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) levels_rx: watch::Receiver<CaptureLevels>,
    pub(crate) state: Arc<S>,
}

impl<S: Clone + Send + Sync + 'static> VoiceSession<S> {
    pub fn builder(api_key: String, model: String) -> VoiceSessionBuilder<S>
    where
        S: Default,
    {
        VoiceSessionBuilder::new(api_key, model)
    }

    pub fn builder_with_state(api_key: String, model: String, state: S) -> VoiceSessionBuilder<S> {
        VoiceSessionBuilder::new_with_state(api_key, model, state)
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// Watch the connecting → connected → {error, closed} lifecycle.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.subscribe_status()
    }

    /// Per-frame microphone telemetry (raw RMS and the talking flag).
    pub fn capture_levels(&self) -> watch::Receiver<CaptureLevels> {
        self.levels_rx.clone()
    }

    /// Feeds one captured 16kHz mono frame through the gate and onto the
    /// wire. The frame is muted in place when it fails the voice-activity
    /// check.
    pub async fn process_capture_frame(&self, frame: &mut [f32]) -> Result<(), LiveError> {
        if self.outgoing.is_none() {
            return Err(LiveError::NotReady);
        }
        self.capture.process_frame(frame).await
    }

    /// Tells the scheduler a buffer finished playing naturally. The sink
    /// must call this so the capture gate relaxes once the assistant goes
    /// quiet.
    pub fn playback_finished(&self, id: BufferId) {
        self.shared
            .scheduler
            .lock()
            .expect("scheduler poisoned")
            .buffer_ended(id);
    }

    /// Web sources the model grounded its answers on so far, deduplicated
    /// by URI.
    pub fn grounding_sources(&self) -> Vec<GroundingSource> {
        self.shared.sources_snapshot()
    }

    pub fn state(&self) -> Arc<S> {
        Arc::clone(&self.state)
    }

    /// Records a fatal audio-device failure, e.g. microphone access denied.
    /// Moves the session to the error state; there is no retry.
    pub fn report_device_error(&self, message: impl Into<String>) {
        self.shared
            .set_status(SessionStatus::Error(message.into()));
    }

    /// Marks the end of the microphone stream without closing the session.
    pub async fn send_audio_stream_end(&self) -> Result<(), LiveError> {
        let Some(sender) = &self.outgoing else {
            return Err(LiveError::NotReady);
        };
        sender
            .send(ClientMessage::RealtimeInput(RealtimeInputPayload {
                audio_stream_end: Some(true),
                ..Default::default()
            }))
            .await
            .map_err(|_| LiveError::Send)
    }

    /// User-initiated teardown. Signals the connection task, which closes
    /// the websocket and moves the session to [`SessionStatus::Closed`].
    pub async fn close(&mut self) -> Result<(), LiveError> {
        info!("session close requested");
        let mut shutdown_guard = self.shutdown_tx.lock().await;
        if let Some(tx) = shutdown_guard.take() {
            if tx.send(()).is_err() {
                info!("shutdown signal not delivered: connection task already gone");
            }
        }
        self.outgoing.take();
        Ok(())
    }
}

impl<S: Clone + Send + Sync + 'static> Drop for VoiceSession<S> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.shutdown_tx.try_lock() {
            if let Some(tx) = guard.take() {
                warn!("session dropped without explicit close(), signalling shutdown");
                if tx.send(()).is_err() {
                    info!("drop: connection task already gone");
                }
            }
        } else if self.outgoing.is_some() {
            warn!("session dropped without close() and shutdown lock unavailable");
        }
        self.outgoing.take();
    }
}
