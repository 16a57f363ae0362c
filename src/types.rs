//! Wire types for the Gemini Live `BidiGenerateContent` protocol.
//!
//! Only the subset the voice companion actually exchanges is modelled here:
//! the initial setup, realtime PCM input, tool calls/responses for the
//! `navigate` tool, and the server content frames carrying audio, grounding
//! metadata and turn signals.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent from the client to the live session.
///
/// Externally tagged on the wire: `{"setup": {...}}`, `{"realtimeInput": {...}}`,
/// `{"toolResponse": {...}}`.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SetupPayload),
    RealtimeInput(RealtimeInputPayload),
    ToolResponse(ToolResponsePayload),
}

/// First message of every session: model, voice, instruction and tools.
#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDeclarations>>,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<ResponseModality>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseModality {
    Audio,
    Text,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_config: Option<VoiceConfig>,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prebuilt_voice_config: Option<PrebuiltVoiceConfig>,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// One entry of the setup `tools` array. Either built-in search grounding or
/// a set of client function declarations.
#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeclarations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search: Option<GoogleSearchTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_declarations: Option<Vec<FunctionDeclaration>>,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct GoogleSearchTool {}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON-schema style parameter description, passed through verbatim.
    pub parameters: Value,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioBlob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_stream_end: Option<bool>,
}

/// Base64 PCM with a MIME-style rate tag, e.g. `audio/pcm;rate=16000`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AudioBlob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponsePayload {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

/// System instruction / conversation content.
#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub parts: Vec<ContentPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    System,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContentPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One frame received from the live session. Exactly one of the fields is
/// normally populated; unknown fields are ignored.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<SetupComplete>,
    pub server_content: Option<ServerContent>,
    pub tool_call: Option<ToolCallPayload>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SetupComplete {}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub interrupted: bool,
    pub turn_complete: bool,
    pub generation_complete: bool,
    pub output_transcription: Option<Transcription>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelTurn {
    pub parts: Vec<ServerPart>,
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerPart {
    pub text: Option<String>,
    pub inline_data: Option<AudioBlob>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Transcription {
    pub text: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolCallPayload {
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionCall {
    pub id: Option<String>,
    pub name: String,
    pub args: Value,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GroundingMetadata {
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GroundingChunk {
    pub web: Option<WebSource>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WebSource {
    pub title: Option<String>,
    pub uri: String,
}

/// A web source the model grounded an answer on. Accumulated per session,
/// deduplicated by URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn setup_message_is_externally_tagged_camel_case() {
        let msg = ClientMessage::Setup(SetupPayload {
            model: "models/gemini-2.5-flash-native-audio-preview".to_string(),
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec![ResponseModality::Audio]),
                speech_config: Some(SpeechConfig {
                    voice_config: Some(VoiceConfig {
                        prebuilt_voice_config: Some(PrebuiltVoiceConfig {
                            voice_name: "Kore".to_string(),
                        }),
                    }),
                }),
                temperature: None,
            }),
            system_instruction: None,
            tools: None,
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value["setup"]["model"],
            "models/gemini-2.5-flash-native-audio-preview"
        );
        assert_eq!(
            value["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            value["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            "Kore"
        );
        assert!(value["setup"].get("systemInstruction").is_none());
    }

    #[test]
    fn realtime_input_serializes_audio_blob() {
        let msg = ClientMessage::RealtimeInput(RealtimeInputPayload {
            audio: Some(AudioBlob {
                mime_type: "audio/pcm;rate=16000".to_string(),
                data: "AAAA".to_string(),
            }),
            audio_stream_end: None,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value["realtimeInput"]["audio"]["mimeType"],
            "audio/pcm;rate=16000"
        );
        assert_eq!(value["realtimeInput"]["audio"]["data"], "AAAA");
    }

    #[test]
    fn tool_response_carries_call_id() {
        let msg = ClientMessage::ToolResponse(ToolResponsePayload {
            function_responses: vec![FunctionResponse {
                id: Some("call-7".to_string()),
                name: "navigate".to_string(),
                response: json!({ "result": "Navigated to /medications" }),
            }],
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["toolResponse"]["functionResponses"][0]["id"], "call-7");
        assert_eq!(
            value["toolResponse"]["functionResponses"][0]["response"]["result"],
            "Navigated to /medications"
        );
    }

    #[test]
    fn deserializes_server_content_with_audio_and_grounding() {
        let raw = json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAD//w==" } },
                        { "text": "Here is what I found." }
                    ],
                    "groundingMetadata": {
                        "groundingChunks": [
                            { "web": { "title": "Tacrolimus and grapefruit", "uri": "https://example.org/a" } },
                            { "notWeb": {} }
                        ]
                    }
                },
                "turnComplete": true
            }
        });
        let msg: ServerMessage = serde_json::from_value(raw).unwrap();
        let content = msg.server_content.unwrap();
        assert!(content.turn_complete);
        assert!(!content.interrupted);
        let turn = content.model_turn.unwrap();
        assert_eq!(turn.parts.len(), 2);
        assert_eq!(
            turn.parts[0].inline_data.as_ref().unwrap().mime_type,
            "audio/pcm;rate=24000"
        );
        let chunks = &turn.grounding_metadata.unwrap().grounding_chunks;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].web.as_ref().unwrap().uri, "https://example.org/a");
        assert!(chunks[1].web.is_none());
    }

    #[test]
    fn deserializes_tool_call_frame() {
        let raw = json!({
            "toolCall": {
                "functionCalls": [
                    { "id": "fc-1", "name": "navigate", "args": { "page": "/medications" } }
                ]
            }
        });
        let msg: ServerMessage = serde_json::from_value(raw).unwrap();
        let calls = msg.tool_call.unwrap().function_calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "navigate");
        assert_eq!(calls[0].args["page"], "/medications");
    }

    #[test]
    fn unknown_server_fields_are_ignored() {
        let raw = json!({ "usageMetadata": { "totalTokenCount": 42 } });
        let msg: ServerMessage = serde_json::from_value(raw).unwrap();
        assert!(msg.setup_complete.is_none());
        assert!(msg.server_content.is_none());
        assert!(msg.tool_call.is_none());
    }
}
