//! Headless streaming run - moves a viewer across the terrain and reports
//! what the chunk quadtree and the engine are doing.
//!
//! Usage: cargo run --release --bin simulate_streaming -- [OPTIONS]
//!
//! Options:
//!   --graph <PATH>        Graph description JSON (default: built-in terrain)
//!   --streaming <PATH>    Streaming config JSON
//!   --ticks <N>           Ticks to simulate (default: 600)
//!   --speed <M>           Viewer speed per tick (default: 4)
//!   --radius <M>          Radius of the viewer's circular path (default: 512)
//!   --report <N>          Ticks between reports (default: 60)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use glam::Vec3;

use terragraph::core::{logging, Result};
use terragraph::graph::presets;
use terragraph::streaming::{ChunkController, RecordingSink};
use terragraph::terrain::{EngineConfig, StreamingConfig, TerrainEngine};
use terragraph::{GraphDescription, NodeRegistry};

fn main() -> Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let ticks = parse_arg(&args, "--ticks").unwrap_or(600u32);
    let speed = parse_arg(&args, "--speed").unwrap_or(4.0f32);
    let radius = parse_arg(&args, "--radius").unwrap_or(512.0f32);
    let report_every = parse_arg(&args, "--report").unwrap_or(60u32).max(1);

    let graph = match parse_arg::<String>(&args, "--graph") {
        Some(path) => GraphDescription::load(&PathBuf::from(path))?.build(&NodeRegistry::with_builtin_nodes())?,
        None => presets::default_terrain(0).0,
    };
    let streaming = match parse_arg::<String>(&args, "--streaming") {
        Some(path) => StreamingConfig::load(&PathBuf::from(path))?,
        None => StreamingConfig::default(),
    };
    let generation_distance = streaming.generation_distance;

    println!("=== Terragraph Streaming Simulation ===");
    println!("Ticks:      {}", ticks);
    println!("Root lod:   {} ({}m)", streaming.root_lod, streaming.chunk_size(streaming.root_lod));
    println!("Distance:   {}m", generation_distance);
    println!("Path:       circle of {}m at {}m/tick", radius, speed);
    println!();

    let mut engine = TerrainEngine::new(graph, EngineConfig::default())?;
    let mut controller = ChunkController::new(streaming);
    let mut sink = RecordingSink::new();
    let start = Instant::now();

    for tick in 0..ticks {
        let angle = tick as f32 * speed / radius.max(1.0);
        let viewer = Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin());

        controller.tick(&mut engine, &mut sink, &[viewer], generation_distance);
        let ready = engine.update();
        log::trace!("Tick {}: {} chunks ready", tick, ready);

        if (tick + 1) % report_every == 0 {
            let stats = engine.stats();
            log::info!(
                "Tick {:>5}: viewer ({:>7.1}, {:>7.1}) | {} roots, {} nodes, {} active | {} requests, {} ready | trees {} live {} closing | buffers {}/{} | {} kernels",
                tick + 1,
                viewer.x,
                viewer.z,
                controller.root_count(),
                controller.nodes().len(),
                controller.active_chunks().len(),
                stats.requests,
                stats.ready_chunks,
                stats.active_trees,
                stats.closing_trees,
                stats.buffers_checked_out,
                stats.buffers_allocated,
                stats.kernels_dispatched
            );
        }
    }

    controller.clear(&mut engine, &mut sink);
    let stats = engine.stats();
    println!(
        "Done in {:.2?}: {} chunks applied, {} cleared, {} kernels, {} diagnostics",
        start.elapsed(),
        sink.applied,
        sink.cleared,
        stats.kernels_dispatched,
        stats.diagnostics
    );
    engine.shutdown();
    Ok(())
}

fn parse_arg<T: FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
