//! Fluent configuration for a live voice session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot, watch};

use crate::audio::playback::{DEFAULT_PLAYBACK_LOOKAHEAD_SECS, SessionClock};
use crate::audio::{OutputClock, PlaybackCommand, PlaybackScheduler, VadConfig, VadGate};
use crate::error::LiveError;
use crate::types::{
    Content, ContentPart, GenerationConfig, GoogleSearchTool, PrebuiltVoiceConfig, ResponseModality,
    Role, SetupPayload, SpeechConfig, ToolDeclarations, VoiceConfig,
};

use super::capture::{CaptureLevels, CapturePipeline};
use super::handle::VoiceSession;
use super::handlers::{EventHandler, Handlers, NavigateContext, ServerContentContext};
use super::{SessionShared, connection, tools};

pub struct VoiceSessionBuilder<S: Clone + Send + Sync + 'static> {
    api_key: String,
    setup: SetupPayload,
    handlers: Handlers<S>,
    state: S,
    vad: VadConfig,
    lookahead: f64,
    clock: Option<Arc<dyn OutputClock>>,
    search_grounding: bool,
    navigation_paths: Option<String>,
}

impl<S: Clone + Send + Sync + 'static + Default> VoiceSessionBuilder<S> {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_state(api_key, model, S::default())
    }
}

impl<S: Clone + Send + Sync + 'static> VoiceSessionBuilder<S> {
    pub fn new_with_state(api_key: String, model: String, state: S) -> Self {
        Self {
            api_key,
            setup: SetupPayload {
                model,
                generation_config: Some(GenerationConfig {
                    response_modalities: Some(vec![ResponseModality::Audio]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            handlers: Handlers::default(),
            state,
            vad: VadConfig::default(),
            lookahead: DEFAULT_PLAYBACK_LOOKAHEAD_SECS,
            clock: None,
            search_grounding: false,
            navigation_paths: None,
        }
    }

    /// Prebuilt voice the model answers with.
    pub fn voice(mut self, voice_name: impl Into<String>) -> Self {
        let config = self.setup.generation_config.get_or_insert_with(Default::default);
        config.speech_config = Some(SpeechConfig {
            voice_config: Some(VoiceConfig {
                prebuilt_voice_config: Some(PrebuiltVoiceConfig {
                    voice_name: voice_name.into(),
                }),
            }),
        });
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        let config = self.setup.generation_config.get_or_insert_with(Default::default);
        config.temperature = Some(temperature);
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.setup.system_instruction = Some(Content {
            parts: vec![ContentPart {
                text: Some(instruction.into()),
            }],
            role: Some(Role::System),
        });
        self
    }

    /// Lets the model ground answers with web search.
    pub fn with_search_grounding(mut self) -> Self {
        self.search_grounding = true;
        self
    }

    /// Declares the navigate tool and registers the handler that performs
    /// the actual routing. `paths_hint` is the list of valid paths shown to
    /// the model, e.g. `"/dashboard", "/medications"`.
    pub fn on_navigate(
        mut self,
        paths_hint: impl Into<String>,
        handler: impl EventHandler<NavigateContext, S> + 'static,
    ) -> Self {
        self.navigation_paths = Some(paths_hint.into());
        self.handlers.on_navigate = Some(Arc::new(handler));
        self
    }

    pub fn on_server_content(
        mut self,
        handler: impl EventHandler<ServerContentContext, S> + 'static,
    ) -> Self {
        self.handlers.on_server_content = Some(Arc::new(handler));
        self
    }

    /// Capture-gate tuning. Defaults match [`VadConfig::default`].
    pub fn vad_config(mut self, config: VadConfig) -> Self {
        self.vad = config;
        self
    }

    /// Gap inserted after a playback underrun, seconds.
    pub fn playback_lookahead(mut self, seconds: f64) -> Self {
        self.lookahead = seconds;
        self
    }

    /// Clock of the output device. Defaults to wall time from session start
    /// when the sink cannot report a real position.
    pub fn output_clock(mut self, clock: Arc<dyn OutputClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Opens the session: spawns the connection task and returns the handle
    /// together with the playback command stream the audio sink must drain.
    pub async fn connect(
        mut self,
    ) -> Result<(VoiceSession<S>, mpsc::Receiver<PlaybackCommand>), LiveError> {
        let mut tool_entries = Vec::new();
        if self.search_grounding {
            tool_entries.push(ToolDeclarations {
                google_search: Some(GoogleSearchTool {}),
                ..Default::default()
            });
        }
        if let Some(paths_hint) = &self.navigation_paths {
            tool_entries.push(ToolDeclarations {
                function_declarations: Some(vec![tools::navigation_declaration(paths_hint)]),
                ..Default::default()
            });
        }
        if !tool_entries.is_empty() {
            self.setup.tools = Some(tool_entries);
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (outgoing_tx, outgoing_rx) = mpsc::channel(100);
        let (playback_tx, playback_rx) = mpsc::channel(100);
        let (levels_tx, levels_rx) = watch::channel(CaptureLevels::default());

        let scheduler = PlaybackScheduler::new(self.lookahead);
        let active_playback = scheduler.active_count_handle();
        let shared = Arc::new(SessionShared::new(scheduler));
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SessionClock::start()) as Arc<dyn OutputClock>);

        let state_arc = Arc::new(self.state);
        let handlers_arc = Arc::new(self.handlers);

        connection::spawn_listener_task(
            self.api_key,
            self.setup,
            handlers_arc,
            Arc::clone(&state_arc),
            Arc::clone(&shared),
            clock,
            shutdown_rx,
            outgoing_rx,
            playback_tx,
        );

        // Give the listener task a moment to begin connecting before the
        // caller starts pushing capture frames.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let capture = CapturePipeline::new(
            VadGate::new(self.vad),
            active_playback,
            levels_tx,
            outgoing_tx.clone(),
        );

        let session = VoiceSession {
            shutdown_tx: Arc::new(TokioMutex::new(Some(shutdown_tx))),
            outgoing: Some(outgoing_tx),
            capture,
            shared,
            levels_rx,
            state: state_arc,
        };
        Ok((session, playback_rx))
    }
}
