// Runtime configuration, read once from the environment.
//
// Env vars (all optional, shown with defaults):
//   INTAKE_API_KEY        (falls back to GEMINI_API_KEY, then API_KEY)
//   INTAKE_LIVE_ENDPOINT  wss://generativelanguage.googleapis.com/ws/...BidiGenerateContent
//   INTAKE_REST_ENDPOINT  https://generativelanguage.googleapis.com/v1beta
//   INTAKE_LIVE_MODEL     gemini-2.5-flash-native-audio-preview-09-2025
//   INTAKE_CHAT_MODEL     gemini-2.5-flash
//   INTAKE_TTS_MODEL      gemini-2.5-flash-preview-tts
//   INTAKE_VOICE          Kore
//   INTAKE_ANNOUNCE       1   (spoken mute/unmute announcements)

use crate::persona;

/// Microphone frames are resampled to this rate before encoding.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
/// Rate of the PCM the live endpoint streams back.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;
/// Samples per encoded microphone frame (256 ms at 16 kHz).
pub const FRAME_SIZE: usize = 4096;

pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/\
google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_REST_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: Option<String>,
    pub live_endpoint: String,
    pub rest_endpoint: String,
    pub live_model: String,
    pub chat_model: String,
    pub tts_model: String,
    pub voice: String,
    pub announce_status: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            live_endpoint: DEFAULT_LIVE_ENDPOINT.into(),
            rest_endpoint: DEFAULT_REST_ENDPOINT.into(),
            live_model: persona::LIVE_MODEL.into(),
            chat_model: persona::CHAT_MODEL.into(),
            tts_model: persona::TTS_MODEL.into(),
            voice: persona::VOICE_NAME.into(),
            announce_status: true,
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup. Empty values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            api_key: get("INTAKE_API_KEY")
                .or_else(|| get("GEMINI_API_KEY"))
                .or_else(|| get("API_KEY")),
            live_endpoint: get("INTAKE_LIVE_ENDPOINT").unwrap_or(defaults.live_endpoint),
            rest_endpoint: get("INTAKE_REST_ENDPOINT").unwrap_or(defaults.rest_endpoint),
            live_model: get("INTAKE_LIVE_MODEL").unwrap_or(defaults.live_model),
            chat_model: get("INTAKE_CHAT_MODEL").unwrap_or(defaults.chat_model),
            tts_model: get("INTAKE_TTS_MODEL").unwrap_or(defaults.tts_model),
            voice: get("INTAKE_VOICE").unwrap_or(defaults.voice),
            announce_status: get("INTAKE_ANNOUNCE")
                .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "off" | "no"))
                .unwrap_or(defaults.announce_status),
        }
    }

    /// The configured API key, if it is non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = AssistantConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg.api_key(), None);
        assert_eq!(cfg.live_model, persona::LIVE_MODEL);
        assert_eq!(cfg.voice, "Kore");
        assert!(cfg.announce_status);
    }

    #[test]
    fn api_key_falls_back_through_legacy_names() {
        let cfg = AssistantConfig::from_lookup(lookup(&[("INTAKE_API_KEY", " "), ("API_KEY", "k-legacy")]));
        assert_eq!(cfg.api_key(), Some("k-legacy"));

        let cfg = AssistantConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k-gemini"),
            ("API_KEY", "k-legacy"),
        ]));
        assert_eq!(cfg.api_key(), Some("k-gemini"));
    }

    #[test]
    fn announcements_can_be_disabled() {
        let cfg = AssistantConfig::from_lookup(lookup(&[("INTAKE_ANNOUNCE", "false")]));
        assert!(!cfg.announce_status);
        let cfg = AssistantConfig::from_lookup(lookup(&[("INTAKE_ANNOUNCE", "yes")]));
        assert!(cfg.announce_status);
    }
}
