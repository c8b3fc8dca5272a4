// Capture pipeline: device-rate mono audio → fixed 16 kHz frames → level +
// encoded blob.

use crate::wire::MediaBlob;

use super::codec;

/// RMS is scaled by this before clamping so normal speech fills the meter.
pub const LEVEL_GAIN: f32 = 10.0;

/// Consecutive outbound send failures tolerated before the session gives up.
pub const SEND_FAILURE_LIMIT: u32 = 25;

pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|s| s * s).sum();
    (sum / frame.len() as f32).sqrt()
}

/// Loudness for the visualiser, clamped to `[0, 1]`.
pub fn level(frame: &[f32]) -> f32 {
    (rms(frame) * LEVEL_GAIN).clamp(0.0, 1.0)
}

/// Streaming linear resampler.
///
/// Keeps the last input sample and the fractional read position between
/// calls so consecutive buffers join without clicks.
#[derive(Debug)]
pub struct Resampler {
    step: f64,
    pos: f64,
    last: Option<f32>,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: from_rate.max(1) as f64 / to_rate.max(1) as f64,
            pos: 0.0,
            last: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.step == 1.0
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() || input.is_empty() {
            return input.to_vec();
        }

        // Logical buffer is `last` (if any) followed by `input`.
        let offset = usize::from(self.last.is_some());
        let len = input.len() + offset;
        let last = self.last;
        let sample = |i: usize| -> f32 {
            match (offset, last) {
                (1, Some(l)) if i == 0 => l,
                _ => input[i - offset],
            }
        };

        let mut out = Vec::with_capacity((input.len() as f64 / self.step) as usize + 1);
        while (self.pos as usize) + 1 < len {
            let i = self.pos as usize;
            let frac = (self.pos - i as f64) as f32;
            let a = sample(i);
            let b = sample(i + 1);
            out.push(a + (b - a) * frac);
            self.pos += self.step;
        }

        self.last = Some(sample(len - 1));
        self.pos -= (len - 1) as f64;
        out
    }
}

/// Cuts a continuous sample stream into fixed-size frames.
#[derive(Debug)]
pub struct FrameAssembler {
    size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            pending: Vec::with_capacity(size),
        }
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);
        let mut frames = Vec::new();
        while self.pending.len() >= self.size {
            let rest = self.pending.split_off(self.size);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Result of processing one frame.
#[derive(Debug, PartialEq)]
pub struct CapturedFrame {
    pub level: f32,
    /// `None` while muted.
    pub blob: Option<MediaBlob>,
}

pub struct CapturePipeline {
    resampler: Resampler,
    assembler: FrameAssembler,
    target_rate: u32,
}

impl CapturePipeline {
    pub fn new(device_rate: u32, target_rate: u32, frame_size: usize) -> Self {
        Self {
            resampler: Resampler::new(device_rate, target_rate),
            assembler: FrameAssembler::new(frame_size),
            target_rate,
        }
    }

    /// Feed raw device audio; returns every complete frame.
    pub fn push(&mut self, raw: &[f32]) -> Vec<Vec<f32>> {
        let resampled = self.resampler.process(raw);
        self.assembler.push(&resampled)
    }

    pub fn process(&self, frame: &[f32], muted: bool) -> CapturedFrame {
        if muted {
            return CapturedFrame {
                level: 0.0,
                blob: None,
            };
        }
        CapturedFrame {
            level: level(frame),
            blob: Some(codec::encode_blob(frame, self.target_rate)),
        }
    }
}

/// Counts consecutive outbound send failures.
#[derive(Debug)]
pub struct SendFailures {
    consecutive: u32,
    limit: u32,
}

impl SendFailures {
    pub fn new(limit: u32) -> Self {
        Self {
            consecutive: 0,
            limit: limit.max(1),
        }
    }

    pub fn record_ok(&mut self) {
        self.consecutive = 0;
    }

    /// Returns `true` once the limit is reached.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive >= self.limit
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
