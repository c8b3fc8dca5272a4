use std::sync::mpsc;

use eframe::egui;
use tokio::sync::mpsc as tokio_mpsc;

use intake_core::{
    chat::{Role, STARTERS},
    AssistantState, Conversation,
};

use crate::bridge::{AppCommand, AppEvent};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Tab {
    Chat,
    Voice,
}

pub struct IntakeApp {
    event_rx: mpsc::Receiver<AppEvent>,
    cmd_tx: tokio_mpsc::UnboundedSender<AppCommand>,

    tab: Tab,
    conversation: Conversation,
    input: String,
    typing: bool,
    confirm_clear: bool,

    voice: AssistantState,
    /// Shown when no key is configured or the service refused it.
    key_prompt: bool,
    key_input: String,
}

impl IntakeApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        event_rx: mpsc::Receiver<AppEvent>,
        cmd_tx: tokio_mpsc::UnboundedSender<AppCommand>,
        has_key: bool,
    ) -> Self {
        Self {
            event_rx,
            cmd_tx,
            tab: Tab::Chat,
            conversation: Conversation::new(),
            input: String::new(),
            typing: false,
            confirm_clear: false,
            voice: AssistantState::default(),
            key_prompt: !has_key,
            key_input: String::new(),
        }
    }

    fn send_chat(&mut self, text: String) {
        let text = text.trim().to_owned();
        if text.is_empty() || self.typing {
            return;
        }
        let conversation = self.conversation.clone();
        self.conversation.push_user(text.clone());
        self.typing = true;
        let _ = self.cmd_tx.send(AppCommand::SendChat { conversation, text });
    }

    fn chat_tab(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Chat");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.small_button("Clear").clicked() {
                    self.confirm_clear = true;
                }
            });
        });
        ui.separator();

        // ── Bottom input bar ─────────────────────────────────────────────
        egui::TopBottomPanel::bottom("chat_input").show_inside(ui, |ui| {
            if self.conversation.messages().len() == 1 {
                ui.horizontal_wrapped(|ui| {
                    for starter in STARTERS {
                        if ui.small_button(starter).clicked() {
                            self.input = starter.to_owned();
                        }
                    }
                });
            }
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                let input_field = egui::TextEdit::singleline(&mut self.input)
                    .hint_text("Type your legal question…")
                    .desired_width(ui.available_width() - 60.0);

                let response = ui.add(input_field);
                let send = ui.add_enabled(!self.typing, egui::Button::new("Send"));
                let submitted = send.clicked()
                    || (response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)));

                if submitted && !self.input.trim().is_empty() {
                    let text = std::mem::take(&mut self.input);
                    self.send_chat(text);
                    response.request_focus();
                }
            });
            ui.add_space(6.0);
        });

        // ── Message history ──────────────────────────────────────────────
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .auto_shrink(false)
            .show(ui, |ui| {
                for msg in self.conversation.messages() {
                    let who = match msg.role {
                        Role::User => "You",
                        Role::Model => "Hannah",
                    };
                    ui.horizontal_wrapped(|ui| {
                        ui.strong(who);
                        if msg.is_error {
                            ui.colored_label(egui::Color32::LIGHT_RED, msg.text.as_str());
                        } else {
                            ui.label(&msg.text);
                        }
                    });
                    if !msg.sources.is_empty() {
                        ui.indent(("sources", msg.text.len()), |ui| {
                            ui.small("Sources");
                            for source in &msg.sources {
                                let title = if source.title.is_empty() {
                                    source.uri.as_str()
                                } else {
                                    source.title.as_str()
                                };
                                ui.hyperlink_to(title, &source.uri);
                            }
                        });
                    }
                    ui.add_space(4.0);
                }
                if self.typing {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.small("Hannah is typing…");
                    });
                }
            });
    }

    fn voice_tab(&mut self, ui: &mut egui::Ui) {
        ui.heading("Voice");
        ui.separator();
        ui.add_space(12.0);

        let v = &self.voice;
        let status = match (v.connected, v.speaking, v.muted) {
            (false, _, _) => "Start a secure voice consultation",
            (true, true, _) => "Hannah is speaking…",
            (true, false, true) => "Microphone muted",
            (true, false, false) => "Listening…",
        };
        ui.label(status);
        ui.add_space(8.0);

        if v.connected {
            ui.add(
                egui::ProgressBar::new(v.volume)
                    .desired_width(240.0)
                    .text(if v.muted { "muted" } else { "mic" }),
            );
            ui.add_space(8.0);
            let muted = v.muted;
            ui.horizontal(|ui| {
                if ui.button(if muted { "Unmute" } else { "Mute" }).clicked() {
                    let _ = self.cmd_tx.send(AppCommand::ToggleMute);
                }
                if ui.button("End call").clicked() {
                    let _ = self.cmd_tx.send(AppCommand::DisconnectVoice);
                }
            });
        } else if ui.button("Start call").clicked() {
            let _ = self.cmd_tx.send(AppCommand::ConnectVoice);
        }

        if let Some(err) = &self.voice.error {
            ui.add_space(12.0);
            ui.colored_label(egui::Color32::LIGHT_RED, err.as_str());
        }
    }

    fn key_window(&mut self, ctx: &egui::Context) {
        egui::Window::new("API key")
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label("A valid API key is required to reach the assistant.");
                ui.horizontal(|ui| {
                    ui.add(egui::TextEdit::singleline(&mut self.key_input).password(true));
                    if ui.button("Save").clicked() && !self.key_input.trim().is_empty() {
                        let key = std::mem::take(&mut self.key_input).trim().to_owned();
                        let _ = self.cmd_tx.send(AppCommand::SetApiKey(key));
                        self.key_prompt = false;
                    }
                });
                if ui.small_button("Later").clicked() {
                    self.key_prompt = false;
                }
            });
    }

    fn clear_window(&mut self, ctx: &egui::Context) {
        egui::Window::new("Clear conversation")
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label("Are you sure you want to clear this conversation?");
                ui.horizontal(|ui| {
                    if ui.button("Clear").clicked() {
                        self.conversation.clear();
                        self.confirm_clear = false;
                    }
                    if ui.button("Cancel").clicked() {
                        self.confirm_clear = false;
                    }
                });
            });
    }
}

impl eframe::App for IntakeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Drain all pending events from the assistant task.
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                AppEvent::ChatReply(reply) => {
                    self.typing = false;
                    self.conversation.push_reply(reply);
                }
                AppEvent::ChatFailed { credential } => {
                    self.typing = false;
                    self.conversation.push_error();
                    self.key_prompt |= credential;
                }
                AppEvent::VoiceState(state) => {
                    // Open once per credential failure, not on every later update.
                    if state.needs_credential && !self.voice.needs_credential {
                        self.key_prompt = true;
                    }
                    self.voice = state;
                }
            }
        }

        // ── Top bar: tabs ─────────────────────────────────────────────────
        egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.strong("Patrick Law Group");
                ui.separator();
                ui.selectable_value(&mut self.tab, Tab::Chat, "Chat");
                ui.selectable_value(&mut self.tab, Tab::Voice, "Voice");
                if self.voice.connected {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.small("● live");
                    });
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.tab {
            Tab::Chat => self.chat_tab(ui),
            Tab::Voice => self.voice_tab(ui),
        });

        if self.key_prompt {
            self.key_window(ctx);
        }
        if self.confirm_clear {
            self.clear_window(ctx);
        }

        // Keep the volume meter moving while a call is live.
        if self.voice.connected {
            ctx.request_repaint_after(std::time::Duration::from_millis(50));
        }
    }
}
