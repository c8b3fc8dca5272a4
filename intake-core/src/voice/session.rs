// One live session. A single task owns the microphone handle, the playback
// scheduler and the remote link from connect to teardown, so nothing here
// needs a lock.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::{
    capture::{CapturePipeline, SendFailures, SEND_FAILURE_LIMIT},
    codec,
    output::{AudioBuffer, InputHandle, OutputContext, PlaybackId},
    playback::PlaybackScheduler,
    protocol::{is_credential_close, ClientMessage, ServerEvent, CLOSE_ABNORMAL},
    state::AssistantState,
    transport::LiveLink,
};
use crate::{
    config::{FRAME_SIZE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE},
    error::AssistantError,
};

/// Requests from the controller to a running session.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    /// Play a status announcement immediately.
    Announce(AudioBuffer),
}

pub(crate) struct Session<I, O> {
    pub input: I,
    pub scheduler: PlaybackScheduler<O>,
    pub link: LiveLink,
    pub frames: mpsc::Receiver<Vec<f32>>,
    pub ended: mpsc::UnboundedReceiver<PlaybackId>,
    pub commands: mpsc::UnboundedReceiver<SessionCommand>,
    pub shutdown: oneshot::Receiver<()>,
    pub muted: Arc<AtomicBool>,
    pub state: watch::Sender<AssistantState>,
}

enum Exit {
    Requested,
    Ended(Option<AssistantError>),
}

impl<I: InputHandle, O: OutputContext> Session<I, O> {
    pub(crate) async fn run(self) {
        let Session {
            input,
            mut scheduler,
            mut link,
            mut frames,
            mut ended,
            mut commands,
            mut shutdown,
            muted,
            state,
        } = self;

        let mut capture = CapturePipeline::new(input.sample_rate(), INPUT_SAMPLE_RATE, FRAME_SIZE);
        let mut failures = SendFailures::new(SEND_FAILURE_LIMIT);

        let exit = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break Exit::Requested,

                event = link.inbound.recv() => {
                    let Some(event) = event else {
                        break Exit::Ended(Some(AssistantError::ConnectionLost));
                    };
                    if let Some(exit) = handle_server_event(event, &mut scheduler, &state) {
                        break exit;
                    }
                }

                raw = frames.recv() => {
                    let Some(raw) = raw else {
                        break Exit::Ended(Some(AssistantError::Microphone("input stream ended".into())));
                    };
                    if let Some(err) =
                        forward_frames(&raw, &muted, &mut capture, &mut failures, &link, &state)
                    {
                        break Exit::Ended(Some(err));
                    }
                }

                Some(id) = ended.recv() => {
                    scheduler.on_ended(id);
                    publish_speaking(&state, scheduler.is_speaking());
                }

                Some(command) = commands.recv() => match command {
                    SessionCommand::Announce(buffer) => {
                        scheduler.play_now(buffer);
                    }
                },
            }
        };

        // Release local resources first so a fresh connect starts clean.
        drop(input);
        scheduler.close();
        link.close().await;
        muted.store(false, Ordering::Relaxed);

        let error = match exit {
            Exit::Requested => {
                info!("live session closed");
                None
            }
            Exit::Ended(None) => {
                info!("live session closed by remote");
                None
            }
            Exit::Ended(Some(err)) => {
                warn!("live session ended: {err} ({})", err.detail().unwrap_or("no detail"));
                Some(err)
            }
        };

        state.send_modify(|s| {
            s.reset();
            if let Some(err) = &error {
                s.set_error(err);
            }
        });
    }
}

fn publish_speaking(state: &watch::Sender<AssistantState>, speaking: bool) {
    state.send_if_modified(|s| {
        let changed = s.speaking != speaking;
        s.speaking = speaking;
        changed
    });
}

fn handle_server_event<O: OutputContext>(
    event: ServerEvent,
    scheduler: &mut PlaybackScheduler<O>,
    state: &watch::Sender<AssistantState>,
) -> Option<Exit> {
    match event {
        ServerEvent::Audio(blob) => {
            match codec::decode_blob(&blob, OUTPUT_SAMPLE_RATE) {
                Ok(buffer) => {
                    if let Some(start) = scheduler.schedule(buffer) {
                        debug!("chunk scheduled at {start:.3}s, cursor {:.3}s", scheduler.next_start());
                    }
                }
                Err(e) => warn!("dropping response chunk: {e}"),
            }
            publish_speaking(state, scheduler.is_speaking());
            None
        }
        ServerEvent::Interrupted => {
            debug!("interrupted, flushing {} playback(s)", scheduler.active_len());
            scheduler.interrupt();
            publish_speaking(state, false);
            None
        }
        ServerEvent::Text(text) => {
            debug!("model text: {text}");
            None
        }
        ServerEvent::TurnComplete => {
            debug!("turn complete");
            None
        }
        ServerEvent::Closed { code, reason } => Some(Exit::Ended(match code {
            None | Some(1000) | Some(1001) => None,
            Some(CLOSE_ABNORMAL) => Some(AssistantError::ConnectionLost),
            Some(code) if is_credential_close(code, &reason) => {
                Some(AssistantError::CredentialRejected(reason))
            }
            Some(code) => Some(AssistantError::Connection(format!("closed ({code}): {reason}"))),
        })),
        ServerEvent::Error(msg) => Some(Exit::Ended(Some(AssistantError::Connection(msg)))),
    }
}

/// Returns an error once outbound sends have failed too many times in a row.
fn forward_frames(
    raw: &[f32],
    muted: &AtomicBool,
    capture: &mut CapturePipeline,
    failures: &mut SendFailures,
    link: &LiveLink,
    state: &watch::Sender<AssistantState>,
) -> Option<AssistantError> {
    for frame in capture.push(raw) {
        let out = capture.process(&frame, muted.load(Ordering::Relaxed));
        // A mute that lands after `process` still wins.
        state.send_modify(|s| {
            s.volume = if muted.load(Ordering::Relaxed) { 0.0 } else { out.level };
        });

        let Some(blob) = out.blob else { continue };
        match link.outbound.try_send(ClientMessage::audio(blob)) {
            Ok(()) => failures.record_ok(),
            Err(e) => {
                warn!("dropping microphone frame: {e}");
                if failures.record_failure() {
                    return Some(AssistantError::Connection(format!(
                        "{} consecutive frame sends failed",
                        failures.consecutive()
                    )));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::MediaBlob;

    struct Silent {
        closed: bool,
    }

    impl OutputContext for Silent {
        fn current_time(&self) -> f64 {
            0.0
        }
        fn start(&mut self, _: AudioBuffer, _: f64) -> PlaybackId {
            PlaybackId(1)
        }
        fn stop(&mut self, _: PlaybackId) {}
        fn close(&mut self) {
            self.closed = true;
        }
        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    fn link() -> (LiveLink, mpsc::Receiver<ClientMessage>) {
        let (out_tx, out_rx) = mpsc::channel(8);
        let (_in_tx, in_rx) = mpsc::channel(8);
        (LiveLink::new(out_tx, in_rx), out_rx)
    }

    #[test]
    fn undecodable_chunk_does_not_start_speaking() {
        let (state, _) = watch::channel(AssistantState::default());
        let mut scheduler = PlaybackScheduler::new(Silent { closed: false });
        let bad = ServerEvent::Audio(MediaBlob {
            mime_type: "audio/pcm;rate=24000".into(),
            data: "***".into(),
        });

        assert!(handle_server_event(bad, &mut scheduler, &state).is_none());
        assert_eq!(scheduler.active_len(), 0);
        assert!(!state.borrow().speaking);

        let good = ServerEvent::Audio(MediaBlob {
            mime_type: "audio/pcm;rate=24000".into(),
            data: "AAAAAA==".into(),
        });
        handle_server_event(good, &mut scheduler, &state);
        assert!(state.borrow().speaking);
    }

    #[test]
    fn credential_close_flags_the_state() {
        let (state, _) = watch::channel(AssistantState::default());
        let mut scheduler = PlaybackScheduler::new(Silent { closed: false });
        let exit = handle_server_event(
            ServerEvent::Closed {
                code: Some(1008),
                reason: "API key not valid".into(),
            },
            &mut scheduler,
            &state,
        );
        let Some(Exit::Ended(Some(err))) = exit else {
            panic!("expected an error exit");
        };
        assert!(err.is_credential());
    }

    #[test]
    fn muted_frames_publish_zero_and_send_nothing() {
        let (state, _) = watch::channel(AssistantState::default());
        let (link, mut sent) = link();
        let mut capture = CapturePipeline::new(INPUT_SAMPLE_RATE, INPUT_SAMPLE_RATE, FRAME_SIZE);
        let mut failures = SendFailures::new(SEND_FAILURE_LIMIT);
        let muted = AtomicBool::new(true);

        let err = forward_frames(&vec![0.5; FRAME_SIZE], &muted, &mut capture, &mut failures, &link, &state);
        assert!(err.is_none());
        assert_eq!(state.borrow().volume, 0.0);
        assert!(sent.try_recv().is_err());

        muted.store(false, Ordering::Relaxed);
        forward_frames(&vec![0.5; FRAME_SIZE], &muted, &mut capture, &mut failures, &link, &state);
        assert_eq!(state.borrow().volume, 1.0);
        assert!(matches!(sent.try_recv(), Ok(ClientMessage::RealtimeInput(_))));
    }

    #[test]
    fn closed_outbound_gives_up_after_the_failure_limit() {
        let (state, _) = watch::channel(AssistantState::default());
        let (link, sent) = link();
        drop(sent);
        let mut capture = CapturePipeline::new(INPUT_SAMPLE_RATE, INPUT_SAMPLE_RATE, FRAME_SIZE);
        let mut failures = SendFailures::new(SEND_FAILURE_LIMIT);
        let muted = AtomicBool::new(false);

        for _ in 1..SEND_FAILURE_LIMIT {
            let frame = vec![0.1; FRAME_SIZE];
            assert!(forward_frames(&frame, &muted, &mut capture, &mut failures, &link, &state).is_none());
        }
        let err = forward_frames(&vec![0.1; FRAME_SIZE], &muted, &mut capture, &mut failures, &link, &state);
        assert!(matches!(err, Some(AssistantError::Connection(_))));
    }
}
