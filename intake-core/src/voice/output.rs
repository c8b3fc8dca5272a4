// Audio device seams used by the live session.
//
// The session task only ever talks to these traits, so the cpal backend and
// the in-memory test doubles are interchangeable.

use tokio::sync::mpsc;

use crate::error::AssistantError;

/// Identifies one scheduled playback on an output context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub u64);

/// Decoded mono audio ready to be played.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// An output clock that can start buffers at scheduled times.
///
/// Playbacks that run to completion are reported on the `ended` channel
/// handed to [`AudioBackend::open_output`]. Stopped playbacks are not.
pub trait OutputContext: Send + 'static {
    /// Seconds elapsed on the output clock.
    fn current_time(&self) -> f64;
    /// Start `buffer` at output time `when` (or immediately if `when` has
    /// already passed).
    fn start(&mut self, buffer: AudioBuffer, when: f64) -> PlaybackId;
    fn stop(&mut self, id: PlaybackId);
    /// Release the device. Idempotent.
    fn close(&mut self);
    fn is_closed(&self) -> bool;
}

/// An open microphone. Dropping it stops capture.
pub trait InputHandle: Send + 'static {
    /// Rate of the mono frames pushed onto the frame channel.
    fn sample_rate(&self) -> u32;
}

pub trait AudioBackend: Send + Sync + 'static {
    type Input: InputHandle;
    type Output: OutputContext;

    /// Acquire the microphone and start pushing mono f32 frames.
    fn open_input(&self, frames: mpsc::Sender<Vec<f32>>) -> Result<Self::Input, AssistantError>;

    fn open_output(
        &self,
        ended: mpsc::UnboundedSender<PlaybackId>,
    ) -> Result<Self::Output, AssistantError>;
}
