// noFriction Meetings - Rewind Inspector
// Prints what a rewind view shows for a meeting at a given offset
//
// Usage: rewind-inspect <meeting-id> [offset-ms]

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use nofriction_rewind::{init_logging, EngineConfig, HttpBackend, RewindEngine, Stream};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let mut args = std::env::args().skip(1);
    let Some(meeting_id) = args.next() else {
        bail!("usage: rewind-inspect <meeting-id> [offset-ms]");
    };
    let offset_ms: u64 = match args.next() {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid offset '{}'", raw))?,
        None => 0,
    };

    let config = EngineConfig::load();
    let backend =
        Arc::new(HttpBackend::from_config(&config).context("failed to configure backend")?);
    match backend.health_check().await {
        Ok(true) => log::info!("✅ Backend healthy: {}", backend.base_url()),
        Ok(false) => log::warn!("⚠️ Backend health check failed: {}", backend.base_url()),
        Err(e) => log::warn!("⚠️ Backend unreachable: {}", e),
    }
    let engine = RewindEngine::new(config, backend.clone(), backend);

    if let Err(e) = engine.capture().reconcile().await {
        log::warn!("⚠️ Could not read capture mode: {}", e);
    }
    println!("capture mode: {:?}", engine.get_capture_mode());

    let handle = engine
        .open_timeline(&meeting_id)
        .await
        .with_context(|| format!("failed to open meeting {}", meeting_id))?;

    let index = engine.snapshot(&handle)?;
    println!(
        "meeting {}: {}ms, {} frames, {} transcript segments, {} accessibility, {} screenshots{}",
        meeting_id,
        index.duration_ms(),
        index.len(Stream::Frame),
        index.len(Stream::Transcript),
        index.len(Stream::Accessibility),
        index.len(Stream::Screenshot),
        if engine.is_live(&handle)? { " (recording)" } else { "" }
    );

    let position = engine.set_scrub_position(&handle, offset_ms)?;
    let moment = engine.moment_at(&handle, position)?;
    println!("{}", serde_json::to_string_pretty(&moment)?);

    engine.close_timeline(&handle)?;
    Ok(())
}
