// Gapless playback of streamed response audio.
//
// Each chunk starts at max(cursor, now) and pushes the cursor forward by its
// duration, so chunks play back-to-back in arrival order without a queue.

use std::collections::HashSet;

use tracing::debug;

use super::output::{AudioBuffer, OutputContext, PlaybackId};

pub struct PlaybackScheduler<O> {
    output: O,
    next_start: f64,
    active: HashSet<PlaybackId>,
    speaking: bool,
    closed: bool,
}

impl<O: OutputContext> PlaybackScheduler<O> {
    /// The cursor starts at the output clock's current time.
    pub fn new(output: O) -> Self {
        let next_start = output.current_time();
        Self {
            output,
            next_start,
            active: HashSet::new(),
            speaking: false,
            closed: false,
        }
    }

    /// Schedule `buffer` after everything already queued. Returns the start
    /// time, or `None` once the scheduler has been closed.
    pub fn schedule(&mut self, buffer: AudioBuffer) -> Option<f64> {
        if self.closed || self.output.is_closed() {
            debug!("dropping chunk scheduled after close");
            return None;
        }
        let duration = buffer.duration();
        let start = self.next_start.max(self.output.current_time());
        let id = self.output.start(buffer, start);
        self.next_start = start + duration;
        self.active.insert(id);
        self.speaking = true;
        Some(start)
    }

    /// Play `buffer` right now, outside the cursor. Used for status
    /// announcements, which are not part of the model's turn.
    pub fn play_now(&mut self, buffer: AudioBuffer) -> Option<PlaybackId> {
        if self.closed || self.output.is_closed() {
            return None;
        }
        let now = self.output.current_time();
        Some(self.output.start(buffer, now))
    }

    /// A playback ran to completion.
    pub fn on_ended(&mut self, id: PlaybackId) {
        if self.active.remove(&id) && self.active.is_empty() {
            self.speaking = false;
        }
    }

    /// Discard everything queued; the next chunk starts at the current time.
    pub fn interrupt(&mut self) {
        self.stop_all();
        self.next_start = 0.0;
        self.speaking = false;
    }

    /// Stop playback and release the output. Later chunks are ignored.
    pub fn close(&mut self) {
        self.interrupt();
        self.output.close();
        self.closed = true;
    }

    fn stop_all(&mut self) {
        for id in self.active.drain() {
            self.output.stop(id);
        }
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn output(&self) -> &O {
        &self.output
    }
}
