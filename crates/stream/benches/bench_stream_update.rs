use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use cellworld_common::{CellCoord, LAND_GRID_SIZE, TEXTURE_INDEX_COUNT};
use cellworld_records::{
    CellRecord, HeightField, LandRecord, MemoryDatabase, Record, RecordData, ReferenceEntry,
    WorldDatabase,
};
use cellworld_scene::Scene;
use cellworld_stream::{BuildMode, CellFactory, CellStreamer, StreamConfig, UpdateTimer, rings};
use cellworld_terrain::{TerrainConfig, decode_land};
use glam::Vec3;

const SIDE: f32 = 8192.0;

fn make_world(extent: i32, refs_per_cell: usize) -> Arc<dyn WorldDatabase> {
    let mut db = MemoryDatabase::new();
    db.insert_record(Record::new("rock", Some("r/rock.nif"), RecordData::Static))
        .unwrap();
    for x in -extent..=extent {
        for z in -extent..=extent {
            let coord = CellCoord::new(x, z);
            let mut cell = CellRecord::exterior(coord);
            for i in 0..refs_per_cell {
                cell = cell.with_reference(ReferenceEntry::new(
                    "rock",
                    Vec3::new(x as f32 * SIDE + i as f32, z as f32 * SIDE, 0.0),
                ));
            }
            db.insert_cell(cell).unwrap();
            db.insert_land(make_land(coord)).unwrap();
        }
    }
    Arc::new(db)
}

fn make_land(coord: CellCoord) -> LandRecord {
    let deltas = (0..LAND_GRID_SIZE * LAND_GRID_SIZE)
        .map(|i| ((i * 7 + coord.x.rem_euclid(5) as usize) % 5) as i8 - 2)
        .collect();
    let textures = (0..TEXTURE_INDEX_COUNT).map(|i| (i % 4) as u16).collect();
    LandRecord {
        coord,
        heights: Some(HeightField {
            reference_height: 0.0,
            deltas,
        }),
        texture_indices: Some(textures),
    }
}

fn bench_decode_land(iterations: usize) {
    let land = make_land(CellCoord::new(3, 0));
    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(decode_land(black_box(&land)));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  decode land ({iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn bench_rings(radius: u32, iterations: usize) {
    let center = CellCoord::new(0, 0);
    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(rings(black_box(center), black_box(radius)).count());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  rings (r={radius}, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn bench_walk(build_mode: BuildMode, refs_per_cell: usize, steps: usize) {
    let db = make_world(12, refs_per_cell);
    let factory = CellFactory::placeholder(db, TerrainConfig::default());
    let config = StreamConfig {
        streaming_radius: 3,
        detail_radius: 1,
        cell_side_length: SIDE,
        load_budget: None,
        build_mode,
    };
    let mut streamer = CellStreamer::new(config, factory);
    let mut scene = Scene::new();
    let mut timer = UpdateTimer::new(steps);

    let start = Instant::now();
    for i in 0..steps {
        // Walk back and forth along X so later steps hit the cache.
        let x = (i % 16) as i32 - 8;
        let viewpoint = Vec3::new((x as f32 + 0.5) * SIDE, 0.0, 0.5 * SIDE);
        let report = streamer.update_streaming(&mut scene, black_box(viewpoint), None);
        black_box(report);
        timer.record(streamer.stats().update_time);
    }
    streamer.flush_pending(&mut scene);
    let elapsed = start.elapsed();
    println!(
        "  walk ({build_mode:?}, {refs_per_cell} refs/cell, {steps} steps): avg {:?}, max {:?}, total {elapsed:?}, built {}",
        timer.average(),
        timer.max(),
        streamer.cache().build_count()
    );
}

fn main() {
    println!("=== Cell Streaming Benchmarks ===\n");

    println!("Land decode:");
    bench_decode_land(1000);

    println!("\nRing iteration:");
    bench_rings(2, 10000);
    bench_rings(8, 1000);

    println!("\nStreaming walk:");
    bench_walk(BuildMode::Synchronous, 10, 64);
    bench_walk(BuildMode::Synchronous, 100, 64);
    bench_walk(BuildMode::Background { workers: 4 }, 10, 64);
    bench_walk(BuildMode::Background { workers: 4 }, 100, 64);

    println!("\n=== Done ===");
}
