// Spoken status announcements ("Microphone muted") via the hosted
// text-to-speech model.

use tracing::debug;

use super::{codec, output::AudioBuffer};
use crate::{
    config::{AssistantConfig, OUTPUT_SAMPLE_RATE},
    rest::{RestClient, RestError},
    wire::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig},
};

#[derive(Clone, Debug)]
pub struct Announcer {
    rest: RestClient,
    model: String,
    voice: String,
}

impl Announcer {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            rest: RestClient::new(&config.rest_endpoint),
            model: config.tts_model.clone(),
            voice: config.voice.clone(),
        }
    }

    pub fn request(&self, text: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: None,
                ..Content::user(text)
            }],
            generation_config: Some(GenerationConfig::spoken(&self.voice)),
            ..Default::default()
        }
    }

    /// Synthesise `text` and return it as playable audio.
    pub async fn speak(&self, api_key: &str, text: &str) -> Result<AudioBuffer, RestError> {
        debug!("announcing {text:?}");
        let resp = self
            .rest
            .generate_content(api_key, &self.model, &self.request(text))
            .await?;
        audio_from_response(&resp)
    }
}

/// First inline audio part of the first candidate.
pub fn audio_from_response(resp: &GenerateContentResponse) -> Result<AudioBuffer, RestError> {
    let blob = resp
        .first()
        .and_then(|c| c.content.as_ref())
        .and_then(|c| c.parts.iter().find_map(|p| p.inline_data.as_ref()))
        .ok_or(RestError::Empty)?;
    codec::decode_blob(blob, OUTPUT_SAMPLE_RATE).map_err(|e| RestError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::voice::codec::encode_blob;

    #[test]
    fn request_asks_for_audio_in_configured_voice() {
        let announcer = Announcer::new(&AssistantConfig::default());
        let v = serde_json::to_value(announcer.request("Microphone muted")).unwrap();
        assert_eq!(v["contents"], json!([{"parts": [{"text": "Microphone muted"}]}]));
        assert_eq!(v["generationConfig"]["responseModalities"], json!(["AUDIO"]));
        assert!(v.get("tools").is_none());
    }

    #[test]
    fn audio_is_extracted_from_first_candidate() {
        let blob = encode_blob(&[0.5; 240], 24_000);
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": blob.mime_type, "data": blob.data}}
            ]}}]
        }))
        .unwrap();
        let buf = audio_from_response(&resp).unwrap();
        assert_eq!(buf.samples.len(), 240);
        assert!((buf.duration() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn empty_response_is_an_error() {
        let resp = GenerateContentResponse::default();
        assert!(matches!(audio_from_response(&resp), Err(RestError::Empty)));
    }
}
