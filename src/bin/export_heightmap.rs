//! Height map exporter - evaluates a graph once and writes a 16-bit PNG.
//!
//! Usage: cargo run --release --bin export_heightmap -- [OPTIONS]
//!
//! Options:
//!   --graph <PATH>        Graph description JSON (default: built-in terrain)
//!   --engine <PATH>       Engine config JSON
//!   --node <NAME>         Node to export (default: the height output)
//!   --resolution <N>      Pixels per side (default: 513)
//!   --scale <METERS>      World size covered (default: 1024)
//!   --seed <SEED>         Seed (default: 0)
//!   --x <X> --z <Z>       Center of the exported square (default: 0, 0)
//!   --relative            Sample in terrain-relative mode
//!   --output <PATH>       Output PNG (default: heightmap.png)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use glam::Vec2;

use terragraph::core::{logging, Result};
use terragraph::graph::presets;
use terragraph::terrain::{EngineConfig, ExportRequest, GenerationMode, TerrainEngine};
use terragraph::{GraphDescription, NodeRegistry};

fn main() -> Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let output = parse_arg::<String>(&args, "--output").unwrap_or_else(|| "heightmap.png".to_string());

    let graph = match parse_arg::<String>(&args, "--graph") {
        Some(path) => {
            log::info!("Loading graph from {}", path);
            GraphDescription::load(&PathBuf::from(path))?.build(&NodeRegistry::with_builtin_nodes())?
        }
        None => presets::default_terrain(0).0,
    };
    let engine_config = match parse_arg::<String>(&args, "--engine") {
        Some(path) => EngineConfig::load(&PathBuf::from(path))?,
        None => EngineConfig::default(),
    };

    let defaults = ExportRequest::default();
    let request = ExportRequest {
        node: parse_arg(&args, "--node"),
        resolution: parse_arg(&args, "--resolution").unwrap_or(defaults.resolution),
        scale: parse_arg(&args, "--scale").unwrap_or(defaults.scale),
        seed: parse_arg(&args, "--seed").unwrap_or(defaults.seed),
        offset: Vec2::new(
            parse_arg(&args, "--x").unwrap_or(0.0),
            parse_arg(&args, "--z").unwrap_or(0.0),
        ),
        mode: if args.iter().any(|a| a == "--relative") {
            GenerationMode::TerrainRelative
        } else {
            GenerationMode::WorldRelative
        },
    };

    println!("=== Terragraph Height Map Export ===");
    println!("Node:       {}", request.node.as_deref().unwrap_or("<height output>"));
    println!("Resolution: {}x{}", request.resolution, request.resolution);
    println!("Scale:      {}m", request.scale);
    println!("Seed:       {}", request.seed);
    println!("Center:     ({}, {})", request.offset.x, request.offset.y);
    println!("Output:     {}", output);
    println!();

    let start = Instant::now();
    let mut engine = TerrainEngine::new(graph, engine_config)?;
    let map = engine.export_map(&request)?;
    let elapsed = start.elapsed();

    map.save_png(&PathBuf::from(&output))?;
    println!(
        "Done in {:.2?}: heights {:.2}..{:.2}, {} diagnostics",
        elapsed,
        map.range.min,
        map.range.max,
        engine.diagnostics().total()
    );
    for diagnostic in engine.diagnostics().entries() {
        println!("  [{}] {}", diagnostic.kind, diagnostic.message);
    }
    Ok(())
}

fn parse_arg<T: FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
