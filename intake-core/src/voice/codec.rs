// PCM16 little-endian <-> f32 conversion and base64 framing.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

use super::output::AudioBuffer;
use crate::wire::MediaBlob;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64 audio: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unsupported audio type {0}")]
    Unsupported(String),
}

pub fn mime_for_rate(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Extract `rate=N` from an `audio/pcm` MIME type.
pub fn rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, v)| v.trim().parse().ok())
}

pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect()
}

/// Encode a mono frame into the blob the live endpoint expects.
pub fn encode_blob(samples: &[f32], sample_rate: u32) -> MediaBlob {
    MediaBlob {
        mime_type: mime_for_rate(sample_rate),
        data: BASE64.encode(encode_pcm16(samples)),
    }
}

/// Decode an inbound audio blob. PCM without a `rate` parameter is assumed
/// to be at `default_rate`.
pub fn decode_blob(blob: &MediaBlob, default_rate: u32) -> Result<AudioBuffer, CodecError> {
    let essence = blob
        .mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence != "audio/pcm" && essence != "audio/l16" {
        return Err(CodecError::Unsupported(blob.mime_type.clone()));
    }
    let bytes = BASE64.decode(blob.data.as_bytes())?;
    let rate = rate_from_mime(&blob.mime_type).unwrap_or(default_rate);
    Ok(AudioBuffer::new(decode_pcm16(&bytes), rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_is_little_endian_and_clamped() {
        let bytes = encode_pcm16(&[0.0, 0.5, -1.0, 2.0]);
        assert_eq!(&bytes[0..2], &[0, 0]);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 16384);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), i16::MIN);
        assert_eq!(i16::from_le_bytes([bytes[6], bytes[7]]), i16::MAX);
    }

    #[test]
    fn decode_scales_by_32768_and_drops_odd_byte() {
        let samples = decode_pcm16(&[0x00, 0x40, 0x00, 0x80, 0x7f]);
        assert_eq!(samples, vec![0.5, -1.0]);
    }

    #[test]
    fn mime_rate_is_parsed_case_insensitively() {
        assert_eq!(rate_from_mime("audio/pcm;rate=24000"), Some(24000));
        assert_eq!(rate_from_mime("audio/pcm; RATE=16000"), Some(16000));
        assert_eq!(rate_from_mime("audio/pcm"), None);
        assert_eq!(mime_for_rate(16000), "audio/pcm;rate=16000");
    }

    #[test]
    fn blob_decoding_uses_declared_or_default_rate() {
        let mut blob = encode_blob(&[0.25; 480], 24000);
        let buf = decode_blob(&blob, 16000).unwrap();
        assert_eq!(buf.sample_rate, 24000);
        assert_eq!(buf.samples.len(), 480);
        assert!((buf.duration() - 0.02).abs() < 1e-9);

        blob.mime_type = "audio/pcm".into();
        assert_eq!(decode_blob(&blob, 16000).unwrap().sample_rate, 16000);
    }

    #[test]
    fn non_pcm_blobs_are_rejected() {
        let blob = MediaBlob {
            mime_type: "audio/ogg".into(),
            data: String::new(),
        };
        assert!(matches!(decode_blob(&blob, 24000), Err(CodecError::Unsupported(_))));

        let blob = MediaBlob {
            mime_type: "audio/pcm".into(),
            data: "***".into(),
        };
        assert!(matches!(decode_blob(&blob, 24000), Err(CodecError::Base64(_))));
    }
}
