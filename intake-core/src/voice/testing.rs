// In-memory audio devices and remote endpoint for session tests.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::{
    output::{AudioBackend, AudioBuffer, InputHandle, OutputContext, PlaybackId},
    protocol::{ClientMessage, LiveSetup, ServerEvent},
    transport::{LiveConnector, LiveLink},
};
use crate::error::AssistantError;

#[derive(Default)]
pub(crate) struct Devices {
    pub input_error: Option<AssistantError>,
    pub output_error: Option<AssistantError>,
    pub frames: Option<mpsc::Sender<Vec<f32>>>,
    pub ended: Option<mpsc::UnboundedSender<PlaybackId>>,
    pub open_inputs: usize,
    pub open_outputs: usize,
    pub clock: f64,
    pub next_id: u64,
    /// (id, start time, duration)
    pub started: Vec<(PlaybackId, f64, f64)>,
    pub stopped: Vec<PlaybackId>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBackend(Arc<Mutex<Devices>>);

impl FakeBackend {
    pub fn devices(&self) -> MutexGuard<'_, Devices> {
        self.0.lock().unwrap()
    }

    pub fn frames(&self) -> mpsc::Sender<Vec<f32>> {
        self.devices().frames.clone().expect("microphone not opened")
    }
}

pub(crate) struct FakeInput(Arc<Mutex<Devices>>);

impl InputHandle for FakeInput {
    fn sample_rate(&self) -> u32 {
        16_000
    }
}

impl Drop for FakeInput {
    fn drop(&mut self) {
        self.0.lock().unwrap().open_inputs -= 1;
    }
}

pub(crate) struct FakeOutput {
    devices: Arc<Mutex<Devices>>,
    closed: bool,
}

impl OutputContext for FakeOutput {
    fn current_time(&self) -> f64 {
        self.devices.lock().unwrap().clock
    }

    fn start(&mut self, buffer: AudioBuffer, when: f64) -> PlaybackId {
        let mut d = self.devices.lock().unwrap();
        d.next_id += 1;
        let id = PlaybackId(d.next_id);
        d.started.push((id, when, buffer.duration()));
        id
    }

    fn stop(&mut self, id: PlaybackId) {
        self.devices.lock().unwrap().stopped.push(id);
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.devices.lock().unwrap().open_outputs -= 1;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for FakeOutput {
    fn drop(&mut self) {
        self.close();
    }
}

impl AudioBackend for FakeBackend {
    type Input = FakeInput;
    type Output = FakeOutput;

    fn open_input(&self, frames: mpsc::Sender<Vec<f32>>) -> Result<FakeInput, AssistantError> {
        let mut d = self.devices();
        if let Some(err) = d.input_error.take() {
            return Err(err);
        }
        d.frames = Some(frames);
        d.open_inputs += 1;
        Ok(FakeInput(self.0.clone()))
    }

    fn open_output(
        &self,
        ended: mpsc::UnboundedSender<PlaybackId>,
    ) -> Result<FakeOutput, AssistantError> {
        let mut d = self.devices();
        if let Some(err) = d.output_error.take() {
            return Err(err);
        }
        d.ended = Some(ended);
        d.open_outputs += 1;
        Ok(FakeOutput {
            devices: self.0.clone(),
            closed: false,
        })
    }
}

#[derive(Default)]
pub(crate) struct Remote {
    pub fail: Option<AssistantError>,
    pub setups: Vec<LiveSetup>,
    pub server: Option<mpsc::Sender<ServerEvent>>,
    pub client: Option<mpsc::Receiver<ClientMessage>>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeConnector(Arc<Mutex<Remote>>);

impl FakeConnector {
    pub fn remote(&self) -> MutexGuard<'_, Remote> {
        self.0.lock().unwrap()
    }

    pub fn server(&self) -> mpsc::Sender<ServerEvent> {
        self.remote().server.clone().expect("not connected")
    }

    pub fn take_client(&self) -> mpsc::Receiver<ClientMessage> {
        self.remote().client.take().expect("not connected")
    }
}

impl LiveConnector for FakeConnector {
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveLink, AssistantError> {
        let mut remote = self.remote();
        remote.setups.push(setup.clone());
        if let Some(err) = remote.fail.take() {
            return Err(err);
        }
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        remote.server = Some(in_tx);
        remote.client = Some(out_rx);
        Ok(LiveLink::new(out_tx, in_rx))
    }
}
