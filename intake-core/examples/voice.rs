//! Headless end-to-end voice session.
//!
//! Opens the default microphone and speaker, connects to the live endpoint
//! and talks until Ctrl-C. State changes are printed as they happen.
//!
//! Run from the workspace root:
//!   INTAKE_API_KEY=... cargo run -p intake-core --example voice
//!
//! Env vars (all optional, shown with defaults):
//!   INTAKE_LIVE_MODEL  gemini-2.5-flash-native-audio-preview-09-2025
//!   INTAKE_VOICE       Kore
//!   INTAKE_MUTE_AFTER  (seconds; toggles mute once when set)
//!   RUST_LOG           intake_core=debug

use std::{env, time::Duration};

use intake_core::{AssistantConfig, LiveAssistant};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| "intake_core=debug".into()))
        .init();

    let config = AssistantConfig::from_env();
    info!("connecting to {} as {}", config.live_model, config.voice);

    let mut assistant = LiveAssistant::new(config);
    assistant.connect().await?;

    let mut state = assistant.subscribe();
    let mute_after = env::var("INTAKE_MUTE_AFTER")
        .ok()
        .and_then(|s| s.parse::<u64>().ok());
    let mute = async {
        match mute_after {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(mute);

    info!("session running, Ctrl-C to stop");
    let mut last_speaking = false;
    let mut mute_done = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut mute, if !mute_done => {
                mute_done = true;
                let muted = assistant.toggle_mute();
                println!("[mute] {muted}");
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let s = state.borrow_and_update().clone();
                if s.speaking != last_speaking {
                    println!("[assistant] {}", if s.speaking { "speaking" } else { "listening" });
                    last_speaking = s.speaking;
                }
                if !s.connected {
                    if let Some(err) = s.error {
                        println!("[error] {err}");
                    }
                    break;
                }
            }
        }
    }

    assistant.disconnect().await;
    Ok(())
}
