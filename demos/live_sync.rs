//! End-to-end pipeline against the public Overpass API: boot a surface,
//! move the viewport, and watch the store fill in and re-render.
//!
//! Run with: cargo run --example live_sync

use std::sync::Arc;
use std::time::Duration;

use hotspot_engine::{
    encode_command, parse_message, GeoSyncAgent, MemoryStore, OverpassProvider, SurfaceCommand,
    SyncConfig, ViewportConfig, ViewportController, DEFAULT_OVERPASS_URL,
};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(OverpassProvider::new(DEFAULT_OVERPASS_URL)?);
    let agent = Arc::new(GeoSyncAgent::new(
        store.clone(),
        provider,
        SyncConfig::default(),
    ));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let controller = ViewportController::new(store.clone(), agent, tx, ViewportConfig::default());

    println!("Live Sync Demo");
    println!("==============");
    println!("Endpoint: {DEFAULT_OVERPASS_URL}\n");

    // Raw bridge traffic exactly as a map surface would send it:
    // boot, then settle on central London at street level.
    let surface_events = [
        r#"{"type":"mapInitialized"}"#,
        r#"{"type":"mapMove","center":{"lat":51.5136,"lng":-0.1365},"zoom":16.0}"#,
    ];
    for raw in surface_events {
        println!("surface -> {raw}");
        controller.handle_surface_message(parse_message(raw)?).await;
    }
    println!();

    // First update renders the (empty) local store; once the Overpass
    // sync lands, the re-query publishes the freshly inserted hotspots.
    let mut updates = 0;
    let mut last_command = None;
    while updates < 2 {
        let command = match tokio::time::timeout(Duration::from_secs(30), rx.recv()).await {
            Ok(Some(command)) => command,
            Ok(None) => break,
            Err(_) => {
                println!("(no further updates within 30s; Overpass may be busy)");
                break;
            }
        };
        updates += 1;

        let SurfaceCommand::UpdateHotspots { hotspots } = &command;
        println!("update {updates}: {} markers", hotspots.len());
        for marker in hotspots.iter().take(10) {
            println!(
                "  - {} [{}] {:.3} mi, {} active",
                marker.id, marker.kind, marker.distance, marker.users
            );
        }
        if hotspots.len() > 10 {
            println!("  ... and {} more", hotspots.len() - 10);
        }

        if updates == 1 && hotspots.is_empty() {
            println!("(waiting for the external sync to fill the store...)");
        }
        println!();
        last_command = Some(command);
    }

    println!("Local store now holds {} hotspots", store.len().await);

    // The wire format as the surface receives it, truncated for readability.
    if let Some(SurfaceCommand::UpdateHotspots { hotspots }) = last_command {
        let sample = SurfaceCommand::UpdateHotspots {
            hotspots: hotspots.into_iter().take(3).collect(),
        };
        println!("\nWire sample (first 3 markers):\n{}", encode_command(&sample)?);
    }

    Ok(())
}
