// Live voice session: CPAL capture and playback streamed to the hosted live
// endpoint over WebSocket.
//
// UI → LiveAssistant::connect → session task (capture ⇄ remote ⇄ playback)
//    → AssistantState on a watch channel → UI

pub mod announce;
pub mod audio;
pub mod capture;
pub mod codec;
pub mod output;
pub mod playback;
pub mod protocol;
mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
mod testing;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn, Instrument};

use crate::{config::AssistantConfig, error::AssistantError, persona};

pub use announce::Announcer;
pub use audio::CpalBackend;
pub use output::{AudioBackend, AudioBuffer, InputHandle, OutputContext, PlaybackId};
pub use playback::PlaybackScheduler;
pub use protocol::{ClientMessage, LiveSetup, ServerEvent};
pub use state::AssistantState;
pub use transport::{LiveConnector, LiveLink, WebSocketConnector};

use session::{Session, SessionCommand};

/// Captured frames buffered between the audio thread and the session task.
const FRAME_QUEUE: usize = 32;

/// Handle to the running session task.
struct ActiveSession {
    shutdown: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    api_key: String,
}

/// The voice assistant's session controller.
///
/// One instance per widget. `connect` creates a session, `disconnect` (or an
/// unrecoverable error) destroys it; state is observable via [`subscribe`].
///
/// [`subscribe`]: LiveAssistant::subscribe
pub struct LiveAssistant<B: AudioBackend = CpalBackend, C: LiveConnector = WebSocketConnector> {
    config: AssistantConfig,
    backend: B,
    connector: C,
    announcer: Option<Announcer>,
    state: watch::Sender<AssistantState>,
    muted: Arc<AtomicBool>,
    session: Option<ActiveSession>,
}

impl LiveAssistant {
    /// Default microphone and speaker, hosted live endpoint from `config`.
    pub fn new(config: AssistantConfig) -> Self {
        let connector = WebSocketConnector::new(config.live_endpoint.clone());
        Self::with_parts(config, CpalBackend, connector)
    }
}

impl<B: AudioBackend, C: LiveConnector> LiveAssistant<B, C> {
    pub fn with_parts(config: AssistantConfig, backend: B, connector: C) -> Self {
        let announcer = config.announce_status.then(|| Announcer::new(&config));
        let (state, _) = watch::channel(AssistantState::default());
        Self {
            config,
            backend,
            connector,
            announcer,
            state,
            muted: Arc::new(AtomicBool::new(false)),
            session: None,
        }
    }

    pub fn state(&self) -> AssistantState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AssistantState> {
        self.state.subscribe()
    }

    /// Replace the API key used by the next `connect`.
    pub fn set_api_key(&mut self, key: impl Into<String>) {
        self.config.api_key = Some(key.into());
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    /// Open the microphone, the output device and the remote session, then
    /// start streaming. Does nothing if a session is already running.
    ///
    /// On failure everything opened so far is released and the state's
    /// `error` holds the user-facing message.
    pub async fn connect(&mut self) -> Result<(), AssistantError> {
        if self.is_connected() {
            return Ok(());
        }
        // A session that ended on its own has already torn itself down.
        self.session = None;
        self.state.send_modify(AssistantState::clear_error);

        match self.open_session().await {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(err) => {
                warn!("connect failed: {err} ({})", err.detail().unwrap_or("no detail"));
                self.state.send_modify(|s| {
                    s.reset();
                    s.set_error(&err);
                });
                Err(err)
            }
        }
    }

    async fn open_session(&mut self) -> Result<ActiveSession, AssistantError> {
        // (a) credentials
        let api_key = self
            .config
            .api_key()
            .ok_or(AssistantError::MissingCredential)?
            .to_owned();

        // (b) microphone
        let (frame_tx, frames) = mpsc::channel(FRAME_QUEUE);
        let input = self.backend.open_input(frame_tx)?;

        // (c) output context; the cursor starts at its current time
        let (ended_tx, ended) = mpsc::unbounded_channel();
        let output = self.backend.open_output(ended_tx)?;
        let scheduler = PlaybackScheduler::new(output);

        // (d) remote session
        let setup = LiveSetup {
            api_key: api_key.clone(),
            model: self.config.live_model.clone(),
            voice: self.config.voice.clone(),
            system_instruction: persona::SYSTEM_INSTRUCTION.to_owned(),
        };
        let link = self.connector.connect(&setup).await?;

        // (e) live
        if let Err(e) = link.outbound.try_send(ClientMessage::text(persona::GREETING_NUDGE)) {
            warn!("greeting nudge not sent: {e}");
        }
        self.muted.store(false, Ordering::Relaxed);
        self.state.send_modify(|s| {
            s.reset();
            s.connected = true;
            s.clear_error();
        });

        let (shutdown_tx, shutdown) = oneshot::channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let session = Session {
            input,
            scheduler,
            link,
            frames,
            ended,
            commands,
            shutdown,
            muted: self.muted.clone(),
            state: self.state.clone(),
        };

        let session_id = uuid::Uuid::new_v4();
        info!(%session_id, "live session connected");
        let task = tokio::spawn(
            session
                .run()
                .instrument(tracing::info_span!("live_session", %session_id)),
        );

        Ok(ActiveSession {
            shutdown: Some(shutdown_tx),
            task,
            commands: commands_tx,
            api_key,
        })
    }

    /// Tear down the session and reset the state. Safe to call at any time,
    /// any number of times. The last error is kept.
    pub async fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Some(tx) = session.shutdown.take() {
                let _ = tx.send(());
            }
            if let Err(e) = session.task.await {
                warn!("session task: {e}");
            }
        }
        self.muted.store(false, Ordering::Relaxed);
        self.state.send_modify(AssistantState::reset);
    }

    /// Flip the microphone mute. Returns the new mute state.
    pub fn toggle_mute(&self) -> bool {
        let muted = !self.muted.fetch_xor(true, Ordering::Relaxed);
        self.state.send_modify(|s| {
            s.muted = muted;
            s.volume = 0.0;
        });
        info!("microphone {}", if muted { "muted" } else { "unmuted" });
        self.announce(if muted {
            persona::MUTED_ANNOUNCEMENT
        } else {
            persona::UNMUTED_ANNOUNCEMENT
        });
        muted
    }

    /// Speak `text` on the running session, best effort.
    fn announce(&self, text: &'static str) {
        let (Some(announcer), Some(session)) = (&self.announcer, &self.session) else {
            return;
        };
        if session.task.is_finished() {
            return;
        }
        let announcer = announcer.clone();
        let commands = session.commands.clone();
        let api_key = session.api_key.clone();
        tokio::spawn(async move {
            match announcer.speak(&api_key, text).await {
                Ok(buffer) => {
                    let _ = commands.send(SessionCommand::Announce(buffer));
                }
                Err(e) => warn!("status announcement failed: {e}"),
            }
        });
    }
}
