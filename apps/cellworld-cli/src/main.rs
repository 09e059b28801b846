mod synthetic;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use cellworld_common::CellCoord;
use cellworld_records::{MemoryDatabase, WorldDatabase};
use cellworld_scene::Scene;
use cellworld_stream::{
    BuildMode, CellFactory, CellStreamer, InteriorLookup, StreamConfig, UpdateTimer,
};
use cellworld_terrain::TerrainConfig;
use clap::{Parser, Subcommand};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cellworld-cli", about = "CLI tool for cellworld streaming")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML file with `stream` and `terrain` sections
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Write a synthetic world database as JSON
    Generate {
        /// Output file
        out: PathBuf,
        /// Cells from the origin to the world edge
        #[arg(short, long, default_value = "4")]
        extent: i32,
        /// Seed for object scatter and terrain noise
        #[arg(short, long, default_value = "42")]
        seed: u64,
    },
    /// Walk a viewpoint across the world and report streaming activity
    Walk {
        /// World database JSON; a synthetic world is used when omitted
        #[arg(short, long)]
        world: Option<PathBuf>,
        /// Target cell X
        #[arg(long, default_value = "3", allow_hyphen_values = true)]
        to_x: i32,
        /// Target cell Z
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        to_z: i32,
        /// Number of updates along the path
        #[arg(long, default_value = "12")]
        steps: usize,
        /// Streaming radius override
        #[arg(short, long)]
        radius: Option<u32>,
        /// Detail radius override
        #[arg(short, long)]
        detail: Option<u32>,
        /// Build on this many background workers
        #[arg(short, long)]
        background: Option<usize>,
    },
    /// Stream the origin, enter an interior, and walk back out
    Interior {
        /// Interior cell name
        name: String,
        /// World database JSON; a synthetic world is used when omitted
        #[arg(short, long)]
        world: Option<PathBuf>,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CliConfig {
    stream: StreamConfig,
    terrain: TerrainConfig,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: CliConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

fn load_world(path: Option<&Path>, side: f32) -> anyhow::Result<Arc<dyn WorldDatabase>> {
    let db = match path {
        Some(path) => MemoryDatabase::load(path)
            .with_context(|| format!("loading world {}", path.display()))?,
        None => synthetic::generate(4, 42, side)?,
    };
    Ok(Arc::new(db))
}

fn cell_center(streamer: &CellStreamer, coord: CellCoord) -> Vec3 {
    streamer.grid().cell_center(coord)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => {
            println!("cellworld-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", cellworld_common::crate_info());
            println!("scene: {}", cellworld_scene::crate_info());
            println!("records: {}", cellworld_records::crate_info());
            println!("terrain: {}", cellworld_terrain::crate_info());
            println!("stream: {}", cellworld_stream::crate_info());
            let stream = config.stream.validated();
            println!(
                "config: radius={}, detail={}, side={}, mode={:?}",
                stream.streaming_radius,
                stream.detail_radius,
                stream.cell_side_length,
                stream.build_mode
            );
        }
        Commands::Generate { out, extent, seed } => {
            let db = synthetic::generate(extent, seed, config.stream.cell_side_length)?;
            db.save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!(
                "Generated {} exterior and {} interior cells ({} records) -> {}",
                db.exterior_count(),
                db.interior_count(),
                db.record_count(),
                out.display()
            );
        }
        Commands::Walk {
            world,
            to_x,
            to_z,
            steps,
            radius,
            detail,
            background,
        } => {
            let mut stream = config.stream;
            if let Some(radius) = radius {
                stream.streaming_radius = radius;
            }
            if let Some(detail) = detail {
                stream.detail_radius = detail;
            }
            if let Some(workers) = background {
                stream.build_mode = BuildMode::Background { workers };
            }

            let db = load_world(world.as_deref(), stream.cell_side_length)?;
            let factory = CellFactory::placeholder(db, config.terrain);
            let mut streamer = CellStreamer::new(stream, factory);
            let mut scene = Scene::new();
            let mut timer = UpdateTimer::new(steps.max(1));

            let from = cell_center(&streamer, CellCoord::new(0, 0));
            let to = cell_center(&streamer, CellCoord::new(to_x, to_z));
            println!("Walking from {from} to {to} in {steps} steps");

            for step in 0..=steps {
                let t = if steps == 0 { 1.0 } else { step as f32 / steps as f32 };
                let report = streamer.update_streaming(&mut scene, from.lerp(to, t), None);
                timer.record(streamer.stats().update_time);
                println!(
                    "step {step:>3}: viewer {} loaded {:>2} evicted {:>2} skipped {:>2} pending {:>2} tracked {:>2}",
                    report.viewer_cell,
                    report.loaded.len(),
                    report.evicted.len(),
                    report.skipped.len(),
                    report.pending,
                    streamer.tracked().len()
                );
            }

            let flushed = streamer.flush_pending(&mut scene);
            if !flushed.is_empty() {
                println!("flushed {} background builds", flushed.len());
            }
            println!(
                "Done: {} cells built, {} tracked, {} scene nodes, {} terrain layers",
                streamer.cache().build_count(),
                streamer.tracked().len(),
                scene.node_count(),
                streamer.factory().synthesizer().layer_cache().len()
            );
            println!(
                "Update time: avg {:?}, min {:?}, max {:?}",
                timer.average(),
                timer.min(),
                timer.max()
            );
        }
        Commands::Interior { name, world } => {
            let stream = config.stream;
            let db = load_world(world.as_deref(), stream.cell_side_length)?;
            let factory = CellFactory::placeholder(db, config.terrain);
            let mut streamer = CellStreamer::new(stream, factory);
            let mut scene = Scene::new();

            let origin = cell_center(&streamer, CellCoord::new(0, 0));
            streamer.update_streaming(&mut scene, origin, None);
            streamer.flush_pending(&mut scene);
            println!("Exterior: {} cells tracked", streamer.tracked().len());

            let cell = streamer
                .request_interior_cell(&mut scene, InteriorLookup::Name(name.clone()))
                .with_context(|| format!("interior {name:?} not found"))?;
            println!("Entered {} ({} cells tracked)", cell.key, streamer.tracked().len());
            for id in scene.descendants(cell.objects) {
                let Some(node) = scene.get(id) else { continue };
                if let Some(tag) = &node.tag {
                    match &tag.door {
                        Some(door) => println!(
                            "  {} {} -> {}",
                            tag.category.tag(),
                            tag.record,
                            door.cell.as_deref().unwrap_or("exterior")
                        ),
                        None => println!("  {} {}", tag.category.tag(), tag.record),
                    }
                }
                if let Some(light) = &node.light {
                    println!(
                        "  light radius={} flicker={} indoors={}",
                        light.radius, light.flicker, light.indoors
                    );
                }
            }

            let report = streamer.update_streaming(&mut scene, origin, None);
            streamer.flush_pending(&mut scene);
            println!(
                "Back outside: evicted {:?}, {} cells tracked, {} built in total",
                report.evicted,
                streamer.tracked().len(),
                streamer.cache().build_count()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cellworld.yaml");
        let yaml = "\
stream:
  streaming_radius: 3
  build_mode:
    mode: background
    workers: 2
terrain:
  generate_masks: true
";
        std::fs::write(&path, yaml).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.stream.streaming_radius, 3);
        assert_eq!(config.stream.detail_radius, 1);
        assert_eq!(config.stream.build_mode, BuildMode::Background { workers: 2 });
        assert!(config.terrain.generate_masks);
        assert_eq!(config.terrain.default_texture, "textures/_land_default.dds");
    }

    #[test]
    fn missing_config_is_default() {
        let config = load_config(None).unwrap();
        assert_eq!(config.stream, StreamConfig::default());
    }

    #[test]
    fn cli_parses_walk() {
        let cli = Cli::try_parse_from([
            "cellworld-cli",
            "walk",
            "--to-x",
            "-2",
            "--steps",
            "4",
            "-b",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Walk {
                to_x,
                steps,
                background,
                ..
            } => {
                assert_eq!(to_x, -2);
                assert_eq!(steps, 4);
                assert_eq!(background, Some(2));
            }
            _ => panic!("expected walk"),
        }
    }
}
