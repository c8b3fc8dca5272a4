// CPAL audio backend for the live session.
//
// MicCapture: default input device → mono f32 frames → session frame channel
// CpalOutput: scheduled mixer → default output device; the mixer's sample
//             counter is the output clock the playback scheduler reads.
//
// IMPORTANT: cpal::Stream deliberately opts out of Send (to support Android's AAudio).
// Streams are built on dedicated OS threads that own them for their entire
// lifetime. Each thread blocks on a kill-channel recv() and exits (dropping
// the stream) when its owner is dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{
    output::{AudioBackend, AudioBuffer, InputHandle, OutputContext, PlaybackId},
};
use crate::error::AssistantError;

/// The host's default input and output devices.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    type Input = MicCapture;
    type Output = CpalOutput;

    fn open_input(&self, frames: mpsc::Sender<Vec<f32>>) -> Result<MicCapture, AssistantError> {
        MicCapture::start(frames)
    }

    fn open_output(
        &self,
        ended: mpsc::UnboundedSender<PlaybackId>,
    ) -> Result<CpalOutput, AssistantError> {
        CpalOutput::start(ended).map_err(|e| AssistantError::AudioInit(e.to_string()))
    }
}

// ── Mic capture ───────────────────────────────────────────────────────────────

/// Captures the default microphone as mono f32 at the device rate.
pub struct MicCapture {
    sample_rate: u32,
    /// Dropping this ends the mic capture thread and stops the cpal stream.
    _kill: std::sync::mpsc::Sender<()>,
}

impl MicCapture {
    pub fn start(frames: mpsc::Sender<Vec<f32>>) -> Result<Self, AssistantError> {
        let (kill_tx, kill_rx) = std::sync::mpsc::channel::<()>();
        // Signals back the device rate, or why the stream could not start.
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<u32, AssistantError>>();

        std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let stream = match build_input_stream(frames) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Block until MicCapture is dropped (kill_tx dropped → recv Err).
                let _ = kill_rx.recv();
                drop(stream);
            })
            .map_err(|e| AssistantError::Microphone(format!("spawn capture thread: {e}")))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| AssistantError::Microphone("input thread died before ready".into()))??;
        info!("microphone open at {sample_rate} Hz");

        Ok(Self {
            sample_rate,
            _kill: kill_tx,
        })
    }
}

impl InputHandle for MicCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

fn build_input_stream(
    frames: mpsc::Sender<Vec<f32>>,
) -> Result<(cpal::Stream, u32), AssistantError> {
    let host = cpal::default_host();
    let dev = host
        .default_input_device()
        .ok_or(AssistantError::MicrophoneNotFound)?;
    let cfg = dev
        .default_input_config()
        .map_err(|e| AssistantError::from_microphone_failure(e.to_string()))?;
    let sample_rate = cfg.sample_rate().0;
    let channels = cfg.channels().max(1) as usize;
    let sample_format = cfg.sample_format();
    let stream_cfg: cpal::StreamConfig = cfg.into();

    let on_error = |e: cpal::StreamError| warn!("cpal input error: {e}");
    let stream = match sample_format {
        cpal::SampleFormat::F32 => dev.build_input_stream(
            &stream_cfg,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = frames.try_send(downmix(data, channels, |s| s));
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => dev.build_input_stream(
            &stream_cfg,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _ = frames.try_send(downmix(data, channels, |s| s as f32 / 32768.0));
            },
            on_error,
            None,
        ),
        other => {
            return Err(AssistantError::Microphone(format!(
                "unsupported input sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| AssistantError::from_microphone_failure(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AssistantError::from_microphone_failure(e.to_string()))?;
    Ok((stream, sample_rate))
}

fn downmix<T: Copy>(data: &[T], channels: usize, to_f32: impl Fn(T) -> f32) -> Vec<f32> {
    data.chunks(channels)
        .map(|frame| frame.iter().map(|&s| to_f32(s)).sum::<f32>() / frame.len() as f32)
        .collect()
}

// ── Scheduled output ──────────────────────────────────────────────────────────

struct Voice {
    id: PlaybackId,
    start: u64,
    samples: Vec<f32>,
    pos: usize,
}

/// Sample-accurate mixer shared with the output callback.
pub(crate) struct Mixer {
    rate: u32,
    clock: u64,
    next_id: u64,
    voices: Vec<Voice>,
    ended: mpsc::UnboundedSender<PlaybackId>,
}

impl Mixer {
    pub(crate) fn new(rate: u32, ended: mpsc::UnboundedSender<PlaybackId>) -> Self {
        Self {
            rate: rate.max(1),
            clock: 0,
            next_id: 0,
            voices: Vec::new(),
            ended,
        }
    }

    pub(crate) fn current_time(&self) -> f64 {
        self.clock as f64 / self.rate as f64
    }

    /// `samples` must already be at the mixer rate.
    pub(crate) fn start(&mut self, samples: Vec<f32>, when: f64) -> PlaybackId {
        self.next_id += 1;
        let id = PlaybackId(self.next_id);
        let start = ((when.max(0.0) * self.rate as f64).round() as u64).max(self.clock);
        self.voices.push(Voice {
            id,
            start,
            samples,
            pos: 0,
        });
        id
    }

    pub(crate) fn stop(&mut self, id: PlaybackId) {
        self.voices.retain(|v| v.id != id);
    }

    pub(crate) fn clear(&mut self) {
        self.voices.clear();
    }

    /// Mix the next `out.len() / channels` frames into `out` (interleaved)
    /// and advance the clock.
    pub(crate) fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        out.fill(0.0);

        let block_start = self.clock;
        let block_end = block_start + frames as u64;
        for voice in &mut self.voices {
            if voice.start >= block_end {
                continue;
            }
            let offset = voice.start.saturating_sub(block_start) as usize;
            let n = (frames - offset).min(voice.samples.len() - voice.pos);
            for i in 0..n {
                let s = voice.samples[voice.pos + i];
                for c in 0..channels {
                    out[(offset + i) * channels + c] += s;
                }
            }
            voice.pos += n;
        }
        for s in out.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
        self.clock = block_end;

        let ended = &self.ended;
        self.voices.retain(|v| {
            let done = v.pos >= v.samples.len();
            if done {
                let _ = ended.send(v.id);
            }
            !done
        });
    }
}

/// Plays scheduled buffers through the default output device.
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    device_rate: u32,
    /// Dropping this ends the output thread and stops the cpal stream.
    kill: Option<std::sync::mpsc::Sender<()>>,
}

impl CpalOutput {
    pub fn start(ended: mpsc::UnboundedSender<PlaybackId>) -> Result<Self> {
        // ── Step 1: Discover output config ───────────────────────────────────
        let (sample_format, config) = {
            let host = cpal::default_host();
            let dev = host
                .default_output_device()
                .ok_or_else(|| anyhow::anyhow!("no default output device"))?;
            let cfg = dev.default_output_config()?;
            (cfg.sample_format(), cfg.config())
        };
        let device_rate = config.sample_rate.0;
        let mixer = Arc::new(Mutex::new(Mixer::new(device_rate, ended)));

        let (kill_tx, kill_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();

        // ── Step 2: Build+own the cpal output stream on a dedicated thread ────
        let mixer_out = mixer.clone();
        std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                let host = cpal::default_host();
                let dev = match host.default_output_device() {
                    Some(d) => d,
                    None => {
                        let _ = ready_tx.send(Err("no default output device".into()));
                        return;
                    }
                };
                let stream = match build_output_stream(sample_format, &config, &dev, mixer_out) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("build output stream: {e}")));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(format!("play output stream: {e}")));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                let _ = kill_rx.recv();
                // `stream` dropped here.
            })?;

        ready_rx
            .recv()
            .map_err(|_| anyhow::anyhow!("output thread died before ready"))?
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        info!("audio output open at {device_rate} Hz");

        Ok(Self {
            mixer,
            device_rate,
            kill: Some(kill_tx),
        })
    }

    fn mixer(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OutputContext for CpalOutput {
    fn current_time(&self) -> f64 {
        self.mixer().current_time()
    }

    fn start(&mut self, buffer: AudioBuffer, when: f64) -> PlaybackId {
        let samples = to_device_rate(buffer, self.device_rate);
        self.mixer().start(samples, when)
    }

    fn stop(&mut self, id: PlaybackId) {
        self.mixer().stop(id);
    }

    fn close(&mut self) {
        if self.kill.take().is_some() {
            self.mixer().clear();
            info!("audio output closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.kill.is_none()
    }
}

/// Linear resample of a whole buffer to `device_rate`. The result spans
/// exactly `buffer.duration()` at the device rate, so back-to-back buffers
/// stay contiguous in the mixer.
fn to_device_rate(buffer: AudioBuffer, device_rate: u32) -> Vec<f32> {
    let AudioBuffer {
        samples,
        sample_rate,
    } = buffer;
    if sample_rate == device_rate || samples.is_empty() || sample_rate == 0 {
        return samples;
    }
    let len = (samples.len() as f64 * device_rate as f64 / sample_rate as f64).round() as usize;
    let step = sample_rate as f64 / device_rate as f64;
    let last = samples.len() - 1;
    (0..len)
        .map(|j| {
            let pos = j as f64 * step;
            let i = (pos as usize).min(last);
            let frac = (pos - i as f64).min(1.0) as f32;
            let a = samples[i];
            let b = samples[(i + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

fn build_output_stream(
    fmt: cpal::SampleFormat,
    config: &cpal::StreamConfig,
    device: &cpal::Device,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<cpal::Stream> {
    let channels = config.channels as usize;
    let stream = match fmt {
        cpal::SampleFormat::F32 => device.build_output_stream::<f32, _, _>(
            config,
            move |data: &mut [f32], _| {
                let mut m = mixer.lock().unwrap_or_else(|e| e.into_inner());
                m.render(data, channels);
            },
            |e| warn!("cpal output error: {e}"),
            None,
        )?,
        cpal::SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream::<i16, _, _>(
                config,
                move |data: &mut [i16], _| {
                    scratch.resize(data.len(), 0.0);
                    mixer
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .render(&mut scratch, channels);
                    for (out, s) in data.iter_mut().zip(&scratch) {
                        *out = (s * i16::MAX as f32) as i16;
                    }
                },
                |e| warn!("cpal output error: {e}"),
                None,
            )?
        }
        other => anyhow::bail!("unsupported output sample format: {other:?}"),
    };
    Ok(stream)
}
