//! Service entry point
//!
//! Reads one extract event (JSON) from the path given as first argument, or
//! from stdin, and prints the response JSON to stdout.

use anyhow::{Context, Result};
use extract_loader::service::{handle_event, ExtractEvent};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let raw = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read event {}", path))?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("Failed to read event from stdin")?;
            raw
        }
    };

    let event = ExtractEvent::from_json_str(&raw).context("Malformed event")?;
    info!("Handling event for {}", event.csvfilename);

    let response = handle_event(&event).await;
    println!("{}", serde_json::to_string(&response)?);
    if response.status_code != 200 {
        std::process::exit(1);
    }
    Ok(())
}
