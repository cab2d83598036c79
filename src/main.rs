use page_streamer::{Config, DetachedPage, RecorderKind, Streamer};

use anyhow::{Context, Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DURATION_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting page-streamer");

    let config = Config::load()?;
    config.validate()?;

    if config.recorder == RecorderKind::Screencast {
        bail!(
            "screencast capture needs an automation session; set \"recorder\": \"grab\" in the config to record the display"
        );
    }

    let mut streamer = Streamer::new(Arc::new(DetachedPage), config.to_options())
        .context("Invalid streamer options")?;
    streamer.start().await.context("Failed to start recording")?;

    tracing::info!("Recording, press Ctrl+C to stop");

    let mut ticker = tokio::time::interval(DURATION_LOG_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::info!("Recorded {}", streamer.duration());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, finalizing output");
                break;
            }
        }
    }

    streamer.stop().await.context("Failed to stop recording")?;

    tracing::info!("Recording saved ({})", streamer.duration());
    Ok(())
}
