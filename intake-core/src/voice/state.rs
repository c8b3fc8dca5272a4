use crate::error::AssistantError;

/// Observable state of the voice assistant, published on a watch channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssistantState {
    pub connected: bool,
    /// The remote side has audio scheduled or playing.
    pub speaking: bool,
    pub muted: bool,
    /// Microphone loudness in `[0, 1]` for visualisation. Zero while muted.
    pub volume: f32,
    /// Last user-facing error. Survives disconnect; cleared by connect.
    pub error: Option<String>,
    /// The last error was a missing or refused API key; the caller should
    /// ask for a new one.
    pub needs_credential: bool,
}

impl AssistantState {
    /// Back to idle, keeping the last error.
    pub(crate) fn reset(&mut self) {
        self.connected = false;
        self.speaking = false;
        self.muted = false;
        self.volume = 0.0;
    }

    pub(crate) fn set_error(&mut self, err: &AssistantError) {
        self.error = Some(err.to_string());
        self.needs_credential = err.is_credential();
    }

    pub(crate) fn clear_error(&mut self) {
        self.error = None;
        self.needs_credential = false;
    }
}
