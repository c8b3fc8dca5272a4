/// Async/sync bridge between the assistant's background task and the egui UI.
use std::sync::mpsc;

use tokio::sync::mpsc as tokio_mpsc;
use tracing::{info, warn};

use intake_core::{
    AssistantConfig, AssistantState, ChatClient, ChatError, ChatReply, Conversation, LiveAssistant,
};

// ── Shared types ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum AppEvent {
    ChatReply(ChatReply),
    ChatFailed {
        /// The key was refused; the UI asks for a new one.
        credential: bool,
    },
    VoiceState(AssistantState),
}

#[derive(Debug)]
pub enum AppCommand {
    /// Answer `text` given the conversation as it was before `text`.
    SendChat { conversation: Conversation, text: String },
    ConnectVoice,
    DisconnectVoice,
    ToggleMute,
    SetApiKey(String),
}

// ── Entry point ───────────────────────────────────────────────────────────────

pub fn spawn_assistant_task(
    config: AssistantConfig,
    event_tx: mpsc::Sender<AppEvent>,
    cmd_rx: tokio_mpsc::UnboundedReceiver<AppCommand>,
    ctx: egui::Context,
) {
    std::thread::spawn(move || match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(assistant_task(config, event_tx, cmd_rx, ctx)),
        Err(e) => {
            warn!("tokio runtime: {e}");
            send(
                &event_tx,
                &ctx,
                AppEvent::VoiceState(AssistantState {
                    error: Some(intake_core::AssistantError::Initialization(e.to_string()).to_string()),
                    ..Default::default()
                }),
            );
        }
    });
}

// ── Assistant task ────────────────────────────────────────────────────────────

async fn assistant_task(
    mut config: AssistantConfig,
    event_tx: mpsc::Sender<AppEvent>,
    mut cmd_rx: tokio_mpsc::UnboundedReceiver<AppCommand>,
    ctx: egui::Context,
) {
    let mut assistant = LiveAssistant::new(config.clone());
    let mut chat = ChatClient::new(&config);

    // Forward every voice state change to the UI.
    {
        let mut state = assistant.subscribe();
        let tx = event_tx.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            while state.changed().await.is_ok() {
                let snapshot = state.borrow_and_update().clone();
                send(&tx, &ctx, AppEvent::VoiceState(snapshot));
            }
        });
    }

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            AppCommand::SendChat { conversation, text } => {
                let chat = chat.clone();
                let tx = event_tx.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let event = match chat.send(&conversation, &text).await {
                        Ok(reply) => AppEvent::ChatReply(reply),
                        Err(e) => {
                            warn!("chat: {e}");
                            AppEvent::ChatFailed {
                                credential: matches!(
                                    e,
                                    ChatError::CredentialRejected(_) | ChatError::MissingCredential
                                ),
                            }
                        }
                    };
                    send(&tx, &ctx, event);
                });
            }

            // ── Voice commands ─────────────────────────────────────────────

            // Failures are already published on the state channel.
            AppCommand::ConnectVoice => {
                if let Err(e) = assistant.connect().await {
                    info!("voice connect: {e}");
                }
            }

            AppCommand::DisconnectVoice => assistant.disconnect().await,

            AppCommand::ToggleMute => {
                assistant.toggle_mute();
            }

            AppCommand::SetApiKey(key) => {
                config.api_key = Some(key.clone());
                assistant.set_api_key(key);
                chat = ChatClient::new(&config);
                info!("API key updated");
            }
        }
    }

    assistant.disconnect().await;
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn send(tx: &mpsc::Sender<AppEvent>, ctx: &egui::Context, event: AppEvent) {
    let _ = tx.send(event);
    ctx.request_repaint();
}
