// demos/voice_companion.rs
//
// Full wiring of the CareBot voice companion against real audio devices:
// cpal microphone capture at 16kHz mono feeds the session's VAD gate, and
// the playback command stream drives a 24kHz output stream whose sample
// position doubles as the scheduler's output clock.

use std::collections::VecDeque;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::anyhow;
use carebot_live::{
    BufferId, CaptureLevels, NavigateContext, OutputClock, PlaybackCommand, ScheduledBuffer,
    SessionStatus, VoiceSession, audio::CAPTURE_SAMPLE_RATE_HZ, audio::PLAYBACK_SAMPLE_RATE_HZ,
};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{error, info, warn};

const SYSTEM_INSTRUCTION: &str = "You are CareBot, a renal health specialist and app companion \
for kidney-transplant recipients.\n\
You can navigate the user to app screens with the 'navigate' tool:\n\
- Dashboard: \"/dashboard\"\n\
- Log Activity: \"/log-activity\"\n\
- History: \"/activity-history\"\n\
- Medications: \"/medications\"\n\
- Analytics: \"/analytics\"\n\
- Education Hub: \"/hub\"\n\
- Achievements: \"/achievements\"\n\
- Settings: \"/settings\"\n\
Use web search to verify medical facts. Be professional, empathetic and \
concise, and preface medical advice with \"Verify with your transplant team.\"";

const NAVIGABLE_PATHS: &str = "\"/dashboard\", \"/log-activity\", \"/activity-history\", \
\"/medications\", \"/analytics\", \"/hub\", \"/achievements\", \"/settings\"";

#[derive(Clone, Default)]
struct CompanionState {
    current_page: Arc<StdMutex<String>>,
}

/// Output clock backed by the number of samples the output stream has
/// actually rendered.
struct DeviceClock {
    samples_played: Arc<AtomicU64>,
}

impl OutputClock for DeviceClock {
    fn now(&self) -> f64 {
        self.samples_played.load(Ordering::Acquire) as f64 / PLAYBACK_SAMPLE_RATE_HZ as f64
    }
}

async fn handle_navigate(ctx: NavigateContext, state: Arc<CompanionState>) {
    info!(page = %ctx.page, "navigating");
    *state.current_page.lock().unwrap() = ctx.page;
}

fn pick_config(
    configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<StreamConfig> {
    for range in configs {
        if range.channels() != 1 || range.sample_format() != SampleFormat::F32 {
            continue;
        }
        if range.min_sample_rate().0 <= target_rate && target_rate <= range.max_sample_rate().0 {
            return Some(range.with_sample_rate(SampleRate(target_rate)).into());
        }
    }
    None
}

fn setup_microphone(
    frame_tx: tokio::sync::mpsc::Sender<Vec<f32>>,
) -> Result<cpal::Stream, anyhow::Error> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no input device available"))?;
    info!("using input device: {}", device.name()?);

    let config = pick_config(device.supported_input_configs()?, CAPTURE_SAMPLE_RATE_HZ)
        .ok_or_else(|| anyhow!("input device does not support 16kHz mono f32"))?;

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if data.is_empty() {
                return;
            }
            match frame_tx.try_send(data.to_vec()) {
                Ok(()) => {}
                Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {}
                Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                    error!("capture channel closed")
                }
            }
        },
        |err| error!("microphone stream error: {}", err),
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

/// One buffer queued on the output side.
struct QueuedBuffer {
    id: BufferId,
    samples: Vec<f32>,
    start_at: f64,
    position: usize,
}

fn setup_speaker(
    command_rx: Receiver<PlaybackCommand>,
    ended_tx: Sender<BufferId>,
    samples_played: Arc<AtomicU64>,
) -> Result<cpal::Stream, anyhow::Error> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no output device available"))?;
    info!("using output device: {}", device.name()?);

    let config = pick_config(device.supported_output_configs()?, PLAYBACK_SAMPLE_RATE_HZ)
        .ok_or_else(|| anyhow!("output device does not support 24kHz mono f32"))?;

    let mut queue: VecDeque<QueuedBuffer> = VecDeque::new();
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            while let Ok(command) = command_rx.try_recv() {
                match command {
                    PlaybackCommand::Start(ScheduledBuffer {
                        id,
                        samples,
                        start_at,
                        ..
                    }) => queue.push_back(QueuedBuffer {
                        id,
                        samples,
                        start_at,
                        position: 0,
                    }),
                    PlaybackCommand::CancelAll => queue.clear(),
                }
            }

            for slot in data.iter_mut() {
                let now = samples_played.load(Ordering::Acquire) as f64
                    / PLAYBACK_SAMPLE_RATE_HZ as f64;
                let mut sample = 0.0;
                let mut finished = None;
                if let Some(front) = queue.front_mut() {
                    if front.start_at <= now {
                        sample = front.samples[front.position];
                        front.position += 1;
                        if front.position >= front.samples.len() {
                            finished = Some(front.id);
                        }
                    }
                }
                if let Some(id) = finished {
                    queue.pop_front();
                    let _ = ended_tx.try_send(id);
                }
                *slot = sample;
                samples_played.fetch_add(1, Ordering::Release);
            }
        },
        |err| error!("speaker stream error: {}", err),
        None,
    )?;
    stream.play()?;
    Ok(stream)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenv::dotenv().ok();

    let api_key = env::var("GEMINI_API_KEY").map_err(|_| "GEMINI_API_KEY not set")?;
    let model = env::var("GEMINI_MODEL")
        .unwrap_or_else(|_| "models/gemini-2.5-flash-native-audio-preview-12-2025".to_string());

    let samples_played = Arc::new(AtomicU64::new(0));
    let clock = Arc::new(DeviceClock {
        samples_played: Arc::clone(&samples_played),
    });

    let (session, mut playback_rx) =
        VoiceSession::<CompanionState>::builder(api_key, model.clone())
            .voice("Kore")
            .system_instruction(SYSTEM_INSTRUCTION)
            .with_search_grounding()
            .on_navigate(NAVIGABLE_PATHS, handle_navigate)
            .output_clock(clock)
            .connect()
            .await?;
    info!("session opened against {}", model);

    // Bridge the async playback command stream into the realtime output
    // callback, and completion reports back out of it.
    let (command_tx, command_rx) = bounded::<PlaybackCommand>(100);
    let (ended_tx, ended_rx) = bounded::<BufferId>(100);
    let _speaker = setup_speaker(command_rx, ended_tx, Arc::clone(&samples_played))?;

    tokio::spawn(async move {
        while let Some(command) = playback_rx.recv().await {
            if command_tx.send(command).is_err() {
                break;
            }
        }
    });
    let ended_session = session.clone();
    tokio::spawn(async move {
        loop {
            match ended_rx.try_recv() {
                Ok(id) => ended_session.playback_finished(id),
                Err(crossbeam_channel::TryRecvError::Empty) => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                Err(crossbeam_channel::TryRecvError::Disconnected) => break,
            }
        }
    });

    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::channel::<Vec<f32>>(20);
    let _microphone = match setup_microphone(frame_tx) {
        Ok(stream) => stream,
        Err(e) => {
            session.report_device_error(format!("Could not access microphone: {e}"));
            return Err(e.into());
        }
    };
    let capture_session = session.clone();
    tokio::spawn(async move {
        while let Some(mut frame) = frame_rx.recv().await {
            if let Err(e) = capture_session.process_capture_frame(&mut frame).await {
                warn!("capture frame dropped: {}", e);
                break;
            }
        }
    });

    let mut status_rx = session.subscribe_status();
    let mut levels_rx: tokio::sync::watch::Receiver<CaptureLevels> = session.capture_levels();
    let mut session = session;
    let mut was_talking = false;

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                match status_rx.borrow().clone() {
                    SessionStatus::Connected => info!("connected, start talking"),
                    SessionStatus::Error(message) => {
                        error!("session failed: {message}");
                        break;
                    }
                    status => info!(?status, "status update"),
                }
            }
            _ = levels_rx.changed() => {
                let talking = levels_rx.borrow().talking;
                if talking != was_talking {
                    info!(talking, "voice activity changed");
                    was_talking = talking;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    if let Err(e) = session.send_audio_stream_end().await {
        warn!("could not signal stream end: {}", e);
    }
    session.close().await?;

    let sources = session.grounding_sources();
    if !sources.is_empty() {
        info!("sources consulted this session:");
        for source in sources {
            info!("  {} ({})", source.title, source.uri);
        }
    }
    info!(
        "last page opened by the assistant: {}",
        session.state().current_page.lock().unwrap()
    );
    Ok(())
}
