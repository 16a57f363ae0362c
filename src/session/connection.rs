//! The per-session connection task.
//!
//! One spawned task owns the websocket and all session mutation: outgoing
//! frames are serialized in arrival order, incoming frames are decoded and
//! fanned out to the playback scheduler, the tool dispatcher and the
//! registered handlers. Once the task exits nothing else writes session
//! state, which is what makes teardown race-free.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::audio::{OutputClock, PlaybackCommand, pcm};
use crate::error::LiveError;
use crate::types::{
    ClientMessage, FunctionCall, FunctionResponse, ServerContent, ServerMessage, SetupPayload,
    GroundingSource, ToolResponsePayload,
};

use super::handlers::{Handlers, NavigateContext, ServerContentContext};
use super::tools::{self, ToolInvocation};
use super::{SessionShared, SessionStatus};

const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

pub(crate) fn build_endpoint_url(api_key: &str) -> Result<Url, LiveError> {
    let mut url = Url::parse(LIVE_ENDPOINT)?;
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_listener_task<S: Clone + Send + Sync + 'static>(
    api_key: String,
    setup: SetupPayload,
    handlers: Arc<Handlers<S>>,
    state: Arc<S>,
    shared: Arc<SessionShared>,
    clock: Arc<dyn OutputClock>,
    shutdown_rx: oneshot::Receiver<()>,
    outgoing_rx: mpsc::Receiver<ClientMessage>,
    playback_tx: mpsc::Sender<PlaybackCommand>,
) {
    tokio::spawn(async move {
        let result = run_session(
            api_key,
            setup,
            handlers,
            state,
            Arc::clone(&shared),
            clock,
            shutdown_rx,
            outgoing_rx,
            playback_tx,
        )
        .await;
        if let Err(e) = result {
            error!("live session terminated: {}", e);
            shared.set_status(SessionStatus::Error(e.to_string()));
        }
    });
}

#[allow(clippy::too_many_arguments)]
async fn run_session<S: Clone + Send + Sync + 'static>(
    api_key: String,
    setup: SetupPayload,
    handlers: Arc<Handlers<S>>,
    state: Arc<S>,
    shared: Arc<SessionShared>,
    clock: Arc<dyn OutputClock>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut outgoing_rx: mpsc::Receiver<ClientMessage>,
    playback_tx: mpsc::Sender<PlaybackCommand>,
) -> Result<(), LiveError> {
    let url = build_endpoint_url(&api_key)?;
    info!(model = %setup.model, "connecting to live endpoint");

    let (ws_stream, _response) = connect_async(url.as_str()).await?;
    let (mut ws_sink, mut ws_read) = ws_stream.split();

    send_client_message(&mut ws_sink, &ClientMessage::Setup(setup)).await?;

    // The handle may drop its sender without an explicit close; stop polling
    // the channel once that happens but keep serving the websocket.
    let mut outgoing_open = true;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("shutdown requested, closing live session");
                if let Err(e) = ws_sink.send(Message::Close(None)).await {
                    debug!("close frame not delivered: {}", e);
                }
                shared.set_status(SessionStatus::Closed);
                return Ok(());
            }
            maybe_payload = outgoing_rx.recv(), if outgoing_open => {
                match maybe_payload {
                    Some(payload) => send_client_message(&mut ws_sink, &payload).await?,
                    None => outgoing_open = false,
                }
            }
            incoming = ws_read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_raw_frame(
                            text.as_str(),
                            &mut ws_sink,
                            &shared,
                            &clock,
                            &playback_tx,
                            &handlers,
                            &state,
                        )
                        .await?;
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            handle_raw_frame(
                                text,
                                &mut ws_sink,
                                &shared,
                                &clock,
                                &playback_tx,
                                &handlers,
                                &state,
                            )
                            .await?;
                        }
                        Err(_) => warn!("ignoring non-UTF8 binary frame from server"),
                    },
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        warn!(?frame, "server closed the connection");
                        return Err(LiveError::Api("connection closed by server".to_string()));
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(LiveError::Api("connection closed by server".to_string())),
                }
            }
        }
    }
}

async fn send_client_message(sink: &mut WsSink, message: &ClientMessage) -> Result<(), LiveError> {
    let json = serde_json::to_string(message)?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}

async fn handle_raw_frame<S: Clone + Send + Sync + 'static>(
    raw: &str,
    ws_sink: &mut WsSink,
    shared: &Arc<SessionShared>,
    clock: &Arc<dyn OutputClock>,
    playback_tx: &mpsc::Sender<PlaybackCommand>,
    handlers: &Arc<Handlers<S>>,
    state: &Arc<S>,
) -> Result<(), LiveError> {
    let replies = handle_server_frame(raw, shared, clock, playback_tx, handlers, state).await;
    for reply in replies {
        send_client_message(ws_sink, &reply).await?;
    }
    Ok(())
}

/// Interprets one server frame. Returns the client messages (tool
/// responses) the connection must send back.
pub(crate) async fn handle_server_frame<S: Clone + Send + Sync + 'static>(
    raw: &str,
    shared: &Arc<SessionShared>,
    clock: &Arc<dyn OutputClock>,
    playback_tx: &mpsc::Sender<PlaybackCommand>,
    handlers: &Arc<Handlers<S>>,
    state: &Arc<S>,
) -> Vec<ClientMessage> {
    let message: ServerMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            warn!("could not parse server frame: {}", e);
            return Vec::new();
        }
    };

    let mut replies = Vec::new();

    if message.setup_complete.is_some() {
        shared.set_status(SessionStatus::Connected);
    }

    if let Some(tool_call) = message.tool_call {
        let responses = dispatch_tool_calls(&tool_call.function_calls, handlers, state).await;
        if !responses.is_empty() {
            replies.push(ClientMessage::ToolResponse(ToolResponsePayload {
                function_responses: responses,
            }));
        }
    }

    if let Some(content) = message.server_content {
        process_server_content(content, shared, clock, playback_tx, handlers, state).await;
    }

    replies
}

/// Executes remote tool calls and builds one response per call, keyed by
/// the call id. Navigation is handed to the registered handler; anything
/// else is answered with an error result.
pub(crate) async fn dispatch_tool_calls<S: Clone + Send + Sync + 'static>(
    calls: &[FunctionCall],
    handlers: &Arc<Handlers<S>>,
    state: &Arc<S>,
) -> Vec<FunctionResponse> {
    let mut responses = Vec::with_capacity(calls.len());
    for call in calls {
        match ToolInvocation::parse(call) {
            Ok(ToolInvocation::Navigate { page }) => {
                info!(page = %page, "remote navigation requested");
                if let Some(handler) = &handlers.on_navigate {
                    handler
                        .handle(NavigateContext { page: page.clone() }, Arc::clone(state))
                        .await;
                } else {
                    warn!("navigate call received but no navigation handler is registered");
                }
                responses.push(tools::navigation_confirmation(call, &page));
            }
            Err(e) => {
                warn!(tool = %call.name, "rejecting tool call: {}", e);
                responses.push(tools::failure_response(call, &e));
            }
        }
    }
    responses
}

/// Applies one server content frame: accumulate grounding sources, decode
/// and schedule audio parts, honor barge-in, then notify the content
/// handler.
pub(crate) async fn process_server_content<S: Clone + Send + Sync + 'static>(
    content: ServerContent,
    shared: &Arc<SessionShared>,
    clock: &Arc<dyn OutputClock>,
    playback_tx: &mpsc::Sender<PlaybackCommand>,
    handlers: &Arc<Handlers<S>>,
    state: &Arc<S>,
) {
    if let Some(turn) = &content.model_turn {
        if let Some(metadata) = &turn.grounding_metadata {
            let sources = metadata.grounding_chunks.iter().filter_map(|chunk| {
                chunk.web.as_ref().map(|web| GroundingSource {
                    title: web.title.clone().unwrap_or_else(|| web.uri.clone()),
                    uri: web.uri.clone(),
                })
            });
            let added = shared.add_sources(sources);
            if added > 0 {
                debug!(count = added, "recorded new grounding sources");
            }
        }

        for part in &turn.parts {
            let Some(blob) = &part.inline_data else {
                continue;
            };
            if !blob.mime_type.starts_with("audio/pcm") {
                debug!(mime = %blob.mime_type, "skipping non-PCM inline data");
                continue;
            }
            // Malformed payloads degrade playback for one frame only.
            match pcm::decode_frame(&blob.data) {
                Ok(samples) if samples.is_empty() => {}
                Ok(samples) => {
                    let buffer = {
                        let mut scheduler = shared.scheduler.lock().expect("scheduler poisoned");
                        scheduler.schedule(samples, clock.now())
                    };
                    if playback_tx
                        .send(PlaybackCommand::Start(buffer))
                        .await
                        .is_err()
                    {
                        warn!("playback sink is gone, dropping scheduled buffer");
                    }
                }
                Err(e) => warn!("dropping malformed audio frame: {}", e),
            }
        }
    }

    if content.interrupted {
        {
            let mut scheduler = shared.scheduler.lock().expect("scheduler poisoned");
            scheduler.interrupt();
        }
        if playback_tx.send(PlaybackCommand::CancelAll).await.is_err() {
            warn!("playback sink is gone, barge-in not delivered");
        }
    }

    if let Some(handler) = &handlers.on_server_content {
        handler
            .handle(ServerContentContext { content }, Arc::clone(state))
            .await;
    }
}
