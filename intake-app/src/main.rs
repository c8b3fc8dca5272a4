// On Windows, don't open a console window behind the app in release builds.
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod bridge;

use app::IntakeApp;
use bridge::spawn_assistant_task;
use intake_core::AssistantConfig;

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "intake=debug,intake_core=debug".into()),
        )
        .init();

    let config = AssistantConfig::from_env();
    let has_key = config.api_key().is_some();

    let (event_tx, event_rx) = std::sync::mpsc::channel();
    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([420.0, 640.0])
            .with_min_inner_size([360.0, 480.0])
            .with_title("Intake Assistant"),
        ..Default::default()
    };

    eframe::run_native(
        "Intake Assistant",
        options,
        Box::new(move |cc| {
            // The bridge needs the egui Context for repaint wakeups.
            spawn_assistant_task(config, event_tx, cmd_rx, cc.egui_ctx.clone());
            Ok(Box::new(IntakeApp::new(cc, event_rx, cmd_tx, has_key)))
        }),
    )
}
