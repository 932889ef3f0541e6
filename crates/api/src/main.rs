//! Driver Watch - Main Entry Point
//!
//! `driver-watch` serves the API. `driver-watch replay <file.jsonl>` runs a
//! recorded landmark stream through one session and prints its summary.

use anyhow::{bail, Context};
use api::{init_logging, run_replay, run_server, Settings};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_logging(&settings.logging)?;

    info!("=== Driver Watch v{} ===", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None => {
            info!(notifier = ?settings.notifier.kind, "Starting driver monitoring service...");
            run_server(settings).await?;
        }
        Some("replay") => {
            let path = PathBuf::from(args.next().context("usage: driver-watch replay <file.jsonl>")?);
            let summary = run_replay(&settings, &path)
                .await
                .with_context(|| format!("replay of {} failed", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Some(other) => bail!("unknown command '{}', expected 'replay'", other),
    }

    Ok(())
}
