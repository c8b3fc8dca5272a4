use thiserror::Error;

/// Failures surfaced by the live voice session.
///
/// `Display` yields the message shown to the caller. The technical detail
/// carried by some variants is for logs only.
#[derive(Debug, Clone, Error)]
pub enum AssistantError {
    #[error("Secure connection failed. A valid API key is required to initiate intake.")]
    MissingCredential,

    #[error("The API key was rejected by the voice service. Please select a valid key and try again.")]
    CredentialRejected(String),

    #[error("I apologize, but I need microphone access to hear you. Please check your system's privacy settings.")]
    MicrophonePermissionDenied(String),

    #[error("I couldn't detect a microphone. Please ensure your device's audio input is properly connected.")]
    MicrophoneNotFound,

    #[error("I'm having trouble accessing your microphone. Please verify your system settings.")]
    Microphone(String),

    #[error("Audio initialization failed. Please try restarting the assistant.")]
    AudioInit(String),

    #[error("Connection error encountered. Please check your internet connection and try again.")]
    Connection(String),

    #[error("The connection was lost unexpectedly due to network instability.")]
    ConnectionLost,

    #[error("I'm sorry, I'm having trouble initializing the secure voice system.")]
    Initialization(String),
}

impl AssistantError {
    /// Technical detail for logging, when the variant carries any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::CredentialRejected(d)
            | Self::MicrophonePermissionDenied(d)
            | Self::Microphone(d)
            | Self::AudioInit(d)
            | Self::Connection(d)
            | Self::Initialization(d) => Some(d),
            Self::MissingCredential | Self::MicrophoneNotFound | Self::ConnectionLost => None,
        }
    }

    /// Missing or refused API key. The user has to supply another one.
    pub fn is_credential(&self) -> bool {
        matches!(self, Self::MissingCredential | Self::CredentialRejected(_))
    }

    /// Classify a microphone failure from the audio backend's error text.
    ///
    /// Host audio APIs report permission problems as backend-specific
    /// strings, so this is a best-effort match.
    pub fn from_microphone_failure(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let lower = detail.to_lowercase();
        if ["permission", "denied", "not allowed", "not authorized", "unauthorized"]
            .iter()
            .any(|p| lower.contains(p))
        {
            Self::MicrophonePermissionDenied(detail)
        } else if ["not available", "no such device", "not found", "no default input"]
            .iter()
            .any(|p| lower.contains(p))
        {
            Self::MicrophoneNotFound
        } else {
            Self::Microphone(detail)
        }
    }
}
