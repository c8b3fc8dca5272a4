// Live endpoint wire messages (JSON over WebSocket).

use serde::{Deserialize, Serialize};

use crate::wire::{Content, GenerationConfig, MediaBlob};

/// Parameters for opening a live session.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveSetup {
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SetupBody),
    RealtimeInput(RealtimeInput),
    ClientContent(ClientContent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupBody {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaBlob>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

impl ClientMessage {
    pub fn setup(setup: &LiveSetup) -> Self {
        let model = if setup.model.starts_with("models/") {
            setup.model.clone()
        } else {
            format!("models/{}", setup.model)
        };
        Self::Setup(SetupBody {
            model,
            generation_config: GenerationConfig::spoken(&setup.voice),
            system_instruction: Content::instruction(&setup.system_instruction),
        })
    }

    pub fn audio(blob: MediaBlob) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![blob],
        })
    }

    /// A complete user text turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self::ClientContent(ClientContent {
            turns: vec![Content::user(text)],
            turn_complete: true,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Raw server frame. Unknown fields are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

/// What the session task reacts to.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    Audio(MediaBlob),
    Text(String),
    Interrupted,
    TurnComplete,
    /// The remote side closed the stream. `code` is the WebSocket close code;
    /// 1006 means it went away without a closing handshake.
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

pub const CLOSE_ABNORMAL: u16 = 1006;

impl ServerMessage {
    pub fn parse(frame: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(frame)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Audio and text parts first, then the interruption flag, then turn
    /// completion.
    pub fn into_events(self) -> Vec<ServerEvent> {
        let Some(content) = self.server_content else {
            return Vec::new();
        };
        let mut events = Vec::new();
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(blob) = part.inline_data {
                    if blob.mime_type.starts_with("audio/") {
                        events.push(ServerEvent::Audio(blob));
                    }
                } else if let Some(text) = part.text {
                    events.push(ServerEvent::Text(text));
                }
            }
        }
        if content.interrupted {
            events.push(ServerEvent::Interrupted);
        }
        if content.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }
        events
    }
}

/// Close codes/reasons that mean the key was refused rather than the
/// network failing.
pub fn is_credential_close(code: u16, reason: &str) -> bool {
    let reason = reason.to_lowercase();
    code == 1008 || reason.contains("api key") || reason.contains("permission denied")
}
