// Text chat with the intake assistant over the REST `generateContent` call,
// grounded with web search.

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::AssistantConfig,
    persona,
    rest::{RestClient, RestError},
    wire::{Content, GenerateContentRequest, GenerateContentResponse, Part, Tool, WebSource},
};

/// Suggested first questions shown under an empty conversation.
pub const STARTERS: [&str; 4] = [
    "I was in a car accident",
    "I need to start a business",
    "Review a contract",
    "Intellectual Property help",
];

/// Shown in place of a reply when the request fails.
pub const APOLOGY: &str = "I apologize, but I am having trouble connecting right now.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub text: String,
    /// Apology placeholders; never sent back as history.
    pub is_error: bool,
    pub sources: Vec<WebSource>,
}

impl Message {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            is_error: false,
            sources: Vec::new(),
        }
    }
}

/// Ordered chat transcript. Always starts with the greeting.
#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: vec![Message::new(Role::Model, persona::GREETING)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::new(Role::User, text));
    }

    pub fn push_reply(&mut self, reply: ChatReply) {
        self.messages.push(Message {
            sources: reply.sources,
            ..Message::new(Role::Model, reply.text)
        });
    }

    pub fn push_error(&mut self) {
        self.messages.push(Message {
            is_error: true,
            ..Message::new(Role::Model, APOLOGY)
        });
    }

    /// Back to just the greeting.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Turns to send as context. Error placeholders are dropped, and so are
    /// model turns before the first user turn since a request must open with
    /// the user.
    pub fn history(&self) -> Vec<Content> {
        self.messages
            .iter()
            .filter(|m| !m.is_error)
            .skip_while(|m| m.role == Role::Model)
            .map(|m| Content {
                role: Some(m.role.as_str().into()),
                parts: vec![Part::text(&m.text)],
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatReply {
    pub text: String,
    /// Web pages the answer was grounded on, deduplicated by URI.
    pub sources: Vec<WebSource>,
}

impl ChatReply {
    pub fn from_response(resp: &GenerateContentResponse) -> Result<Self, RestError> {
        let candidate = resp.first().ok_or(RestError::Empty)?;
        let text = candidate
            .content
            .as_ref()
            .map(Content::joined_text)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(RestError::Empty);
        }

        let mut sources: Vec<WebSource> = Vec::new();
        for web in candidate
            .grounding_metadata
            .iter()
            .flat_map(|g| &g.grounding_chunks)
            .filter_map(|c| c.web.as_ref())
        {
            if !sources.iter().any(|s| s.uri == web.uri) {
                sources.push(web.clone());
            }
        }

        Ok(Self { text, sources })
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no API key configured")]
    MissingCredential,

    #[error("the API key was rejected: {0}")]
    CredentialRejected(RestError),

    #[error("message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Request(RestError),
}

impl From<RestError> for ChatError {
    fn from(err: RestError) -> Self {
        if err.is_credential_rejection() {
            ChatError::CredentialRejected(err)
        } else {
            ChatError::Request(err)
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChatClient {
    rest: RestClient,
    model: String,
    api_key: Option<String>,
}

impl ChatClient {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            rest: RestClient::new(&config.rest_endpoint),
            model: config.chat_model.clone(),
            api_key: config.api_key().map(str::to_owned),
        }
    }

    pub fn build_request(&self, conversation: &Conversation, text: &str) -> GenerateContentRequest {
        let mut contents = conversation.history();
        contents.push(Content::user(text));
        GenerateContentRequest {
            contents,
            system_instruction: Some(Content::instruction(persona::SYSTEM_INSTRUCTION)),
            tools: vec![Tool::default()],
            generation_config: None,
        }
    }

    /// Ask the model to answer `text` in the context of `conversation`,
    /// which should not yet contain `text`.
    pub async fn send(&self, conversation: &Conversation, text: &str) -> Result<ChatReply, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let api_key = self.api_key.as_deref().ok_or(ChatError::MissingCredential)?;

        let request = self.build_request(conversation, text);
        debug!("chat request with {} turn(s)", request.contents.len());

        let reply = self
            .rest
            .generate_content(api_key, &self.model, &request)
            .await
            .and_then(|resp| ChatReply::from_response(&resp))
            .map_err(|e| {
                warn!("chat request failed: {e}");
                ChatError::from(e)
            })?;
        Ok(reply)
    }
}
