//! Microphone-side pipeline: VAD gating, PCM16 encoding and transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, watch};
use tracing::trace;

use crate::audio::{CAPTURE_SAMPLE_RATE_HZ, VadGate, pcm};
use crate::error::LiveError;
use crate::types::{ClientMessage, RealtimeInputPayload};

/// Per-frame telemetry for the embedding UI: raw microphone energy and
/// whether the user cleared the gate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CaptureLevels {
    pub rms: f32,
    pub talking: bool,
}

/// Gates, encodes and ships captured frames in arrival order.
///
/// The pipeline is cheap to clone; all clones feed the same session and
/// telemetry channel.
#[derive(Clone)]
pub(crate) struct CapturePipeline {
    gate: VadGate,
    active_playback: Arc<AtomicUsize>,
    levels_tx: watch::Sender<CaptureLevels>,
    outgoing: mpsc::Sender<ClientMessage>,
}

impl CapturePipeline {
    pub(crate) fn new(
        gate: VadGate,
        active_playback: Arc<AtomicUsize>,
        levels_tx: watch::Sender<CaptureLevels>,
        outgoing: mpsc::Sender<ClientMessage>,
    ) -> Self {
        Self {
            gate,
            active_playback,
            levels_tx,
            outgoing,
        }
    }

    /// Processes one captured frame: gate against the adaptive threshold
    /// (raised while remote audio is active), publish telemetry, then encode
    /// and send the possibly-muted frame.
    pub(crate) async fn process_frame(&self, frame: &mut [f32]) -> Result<(), LiveError> {
        if frame.is_empty() {
            return Ok(());
        }

        let remote_speaking = self.active_playback.load(Ordering::Acquire) > 0;
        let outcome = self.gate.apply(frame, remote_speaking);
        self.levels_tx.send_replace(CaptureLevels {
            rms: outcome.rms,
            talking: outcome.talking,
        });
        trace!(
            rms = outcome.rms,
            talking = outcome.talking,
            remote_speaking,
            "captured frame"
        );

        let blob = pcm::encode_frame(frame, CAPTURE_SAMPLE_RATE_HZ);
        let payload = RealtimeInputPayload {
            audio: Some(blob),
            ..Default::default()
        };
        self.outgoing
            .send(ClientMessage::RealtimeInput(payload))
            .await
            .map_err(|_| LiveError::Send)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::VadConfig;
    use tokio::time::{Duration, timeout};

    fn pipeline(
        active_playback: Arc<AtomicUsize>,
    ) -> (
        CapturePipeline,
        mpsc::Receiver<ClientMessage>,
        watch::Receiver<CaptureLevels>,
    ) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(10);
        let (levels_tx, levels_rx) = watch::channel(CaptureLevels::default());
        let pipeline = CapturePipeline::new(
            VadGate::new(VadConfig::default()),
            active_playback,
            levels_tx,
            outgoing_tx,
        );
        (pipeline, outgoing_rx, levels_rx)
    }

    async fn recv_blob(rx: &mut mpsc::Receiver<ClientMessage>) -> crate::types::AudioBlob {
        match timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Some(ClientMessage::RealtimeInput(input))) => {
                input.audio.expect("expected an audio blob")
            }
            other => panic!("expected realtime input, got {:?}", other.map(|m| m.is_some())),
        }
    }

    #[tokio::test]
    async fn loud_frame_is_sent_intact_and_flagged_talking() {
        let (pipeline, mut rx, levels) = pipeline(Arc::new(AtomicUsize::new(0)));
        let mut frame = vec![0.02f32; 512];
        pipeline.process_frame(&mut frame).await.unwrap();

        let blob = recv_blob(&mut rx).await;
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        let decoded = pcm::decode_frame(&blob.data).unwrap();
        assert!(decoded.iter().all(|&s| s > 0.0));
        assert!(levels.borrow().talking);
        assert!((levels.borrow().rms - 0.02).abs() < 1e-6);
    }

    #[tokio::test]
    async fn quiet_frame_is_transmitted_as_silence() {
        let (pipeline, mut rx, levels) = pipeline(Arc::new(AtomicUsize::new(0)));
        let mut frame = vec![0.003f32; 512];
        pipeline.process_frame(&mut frame).await.unwrap();

        let blob = recv_blob(&mut rx).await;
        let decoded = pcm::decode_frame(&blob.data).unwrap();
        assert!(decoded.iter().all(|&s| s == 0.0));
        assert!(!levels.borrow().talking);
    }

    #[tokio::test]
    async fn active_playback_mutes_moderate_speech() {
        let active = Arc::new(AtomicUsize::new(1));
        let (pipeline, mut rx, levels) = pipeline(active);
        // 0.02 clears the base threshold (0.008) but not 5x of it.
        let mut frame = vec![0.02f32; 512];
        pipeline.process_frame(&mut frame).await.unwrap();

        let blob = recv_blob(&mut rx).await;
        let decoded = pcm::decode_frame(&blob.data).unwrap();
        assert!(decoded.iter().all(|&s| s == 0.0));
        assert!(!levels.borrow().talking);
    }

    #[tokio::test]
    async fn empty_frames_are_dropped_silently() {
        let (pipeline, mut rx, _levels) = pipeline(Arc::new(AtomicUsize::new(0)));
        pipeline.process_frame(&mut []).await.unwrap();
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn closed_transport_surfaces_send_error() {
        let (pipeline, rx, _levels) = pipeline(Arc::new(AtomicUsize::new(0)));
        drop(rx);
        let mut frame = vec![0.5f32; 16];
        let err = pipeline.process_frame(&mut frame).await.unwrap_err();
        assert!(matches!(err, LiveError::Send));
    }
}
